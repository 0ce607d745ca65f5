use crate::{Error, Message};

/// An asynchronous message channel to the scripting runtime.
///
/// `post` must not block waiting for the runtime; it only enqueues.
pub trait Port: Send + Sync {
	fn post(&self, message: Message) -> Result<(), Error>;
}

impl Port for tokio::sync::mpsc::UnboundedSender<Message> {
	fn post(&self, message: Message) -> Result<(), Error> {
		self.send(message).map_err(|_| Error::Closed)
	}
}
