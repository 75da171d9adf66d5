use super::result::{NotifyResult, Reply};
use crate::job::Job;
use crate::registry::CallbackRegistry;

use log::debug;
use std::sync::mpsc::{self, Receiver, SendError, Sender};

/// Worker-side end of the notification channel.
pub(crate) struct Notifier {
    sender: Sender<NotifyResult>,
}

impl Notifier {
    /// Creates the notifier and the receiving end owned by the issuing loop.
    pub(crate) fn new() -> (Self, Receiver<NotifyResult>) {
        let (sender, receiver) = mpsc::channel();

        (Self { sender }, receiver)
    }

    /// Queues `result` for the issuing loop and returns immediately.
    ///
    /// The result is dropped if the job was cancelled before it could be
    /// registered.
    pub(crate) fn oneway(&self, callbacks: &CallbackRegistry, job: &Job, mut result: NotifyResult) {
        let Some(id) = callbacks.add(job) else {
            debug!(
                "job {} cancelled, dropping {} result",
                result.handle, result.kind
            );
            return;
        };

        result.callback_id = id;

        if let Err(SendError(result)) = self.sender.send(result) {
            debug!("loop gone, dropping {} result of job {}", result.kind, result.handle);
            callbacks.take(id);
        }
    }

    /// Queues `result` and blocks until the issuing loop ran its callback.
    ///
    /// Returns [`Reply::Cancelled`] without waiting if the job is already
    /// cancelled, and if the loop drops the result unanswered.
    pub(crate) fn synchronous(
        &self,
        callbacks: &CallbackRegistry,
        job: &Job,
        mut result: NotifyResult,
    ) -> Reply {
        let (reply, answer) = mpsc::sync_channel(1);
        result.reply = Some(reply);

        let Some(id) = callbacks.add(job) else {
            debug!(
                "job {} cancelled, not waiting for {} callback",
                result.handle, result.kind
            );
            return Reply::Cancelled;
        };

        result.callback_id = id;

        if self.sender.send(result).is_err() {
            callbacks.take(id);
            return Reply::Cancelled;
        }

        answer.recv().unwrap_or(Reply::Cancelled)
    }
}
