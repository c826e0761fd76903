use crate::domain::notification::Notification;

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}
