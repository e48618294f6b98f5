use super::selector::Selector;
use crate::types::{OperationKind, Record};

/// Payload carried by an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    One(Record),
    Many(Vec<Record>),
}

/// One unit of work handed from the REST adapter to the gateway
#[derive(Debug, Clone)]
pub struct Envelope {
    pub entity: String,
    pub operation: OperationKind,
    pub selector: Selector,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(entity: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            entity: entity.into(),
            operation,
            selector: Selector::default(),
            payload: Payload::None,
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}
