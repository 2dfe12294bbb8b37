//! Request and response types exchanged between clients and the hub.

/// A request from a client, tagged so replies can be matched up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub tag: String,
    pub body: RequestBody,
}

impl Request {
    pub fn new(tag: impl Into<String>, body: RequestBody) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }
}

/// Operations the hub can perform on its list.
///
/// Each kind has exactly one dispatch arm in the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    SetAutoMode {
        auto_mode: bool,
    },

    /// Insert an item before `index` (`index == len` appends).
    Enqueue {
        index: usize,
        item: String,
    },

    Dequeue {
        index: usize,
    },

    /// Query the whole list state. Answered only to the requester.
    Dump,
}

/// Who a response is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Every attached client, requester included.
    Broadcast,
    /// Only the requesting client; carries the request tag.
    Reply(String),
}

/// A response from the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub delivery: Delivery,
    pub body: Responder,
}

impl Response {
    pub fn broadcast(body: Responder) -> Self {
        Self {
            delivery: Delivery::Broadcast,
            body,
        }
    }

    pub fn reply(tag: impl Into<String>, body: Responder) -> Self {
        Self {
            delivery: Delivery::Reply(tag.into()),
            body,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.delivery == Delivery::Broadcast
    }
}

/// Response payloads, one shape per kind of outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    AutoMode(bool),

    Enqueued {
        index: usize,
        item: String,
    },

    Dequeued {
        index: usize,
        item: String,
    },

    /// Full list state, in answer to [`RequestBody::Dump`].
    Dump {
        auto_mode: bool,
        items: Vec<String>,
    },

    /// The request was understood but could not be applied.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_constructors_set_delivery() {
        assert!(Response::broadcast(Responder::AutoMode(true)).is_broadcast());

        let reply = Response::reply("t1", Responder::Failed("nope".to_string()));
        assert_eq!(reply.delivery, Delivery::Reply("t1".to_string()));
        assert!(!reply.is_broadcast());
    }
}
