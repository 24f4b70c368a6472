//! Channel-side contracts of the dispatcher.
//!
//! Transport adapters build [`Event`](parley_common::types::Event)s with
//! [`inbound::compose`] and hand them to the dispatcher. The dispatcher then
//! drives the three collaborators defined in [`plugin`]: a reply generator,
//! a reply decorator, and a reply sender.

pub mod decorate;
pub mod error;
pub mod gating;
pub mod inbound;
pub mod plugin;
pub mod registry;

pub use {
    decorate::ConfigDecorator,
    error::{Error, Result},
    inbound::{
        BotIdentity, InboundContent, InboundGroup, InboundMessage, compose, friend_request_reply,
    },
    plugin::{
        Generated, PassthroughDecorator, ReplyContext, ReplyDecorator, ReplyGenerator,
        ReplyRequest, ReplySender,
    },
    registry::SenderRegistry,
};
