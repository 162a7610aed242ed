//! The application hook: turn a parsed request into a response message.

use std::future::{ready, Future, Ready};

use crate::protocol::{Blob, Kind, Message};

pub trait Handler: Send + Sync {
    type Fut<'fut>: Future<Output = Message> + Send
    where
        Self: 'fut;

    fn call(&self, request: Message) -> Self::Fut<'_>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Message> + Send,
{
    type Fut<'fut> = Fut where Self: 'fut;

    fn call(&self, request: Message) -> Self::Fut<'_> {
        (self.f)(request)
    }
}

pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Message> + Send,
{
    HandlerFn { f }
}

/// The default handler: every request gets `200` with a `Hello World!`
/// body.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelloWorld;

impl Handler for HelloWorld {
    type Fut<'fut> = Ready<Message>;

    fn call(&self, _request: Message) -> Self::Fut<'_> {
        let mut response = Message::new(Kind::Response);
        response.set_status_code(200).set_reason("OK");
        response.set_body(Blob::from_bytes(b"Hello World!"));
        ready(response)
    }
}
