//! External delivery channels for pipeline notifications.

pub mod webhook;
