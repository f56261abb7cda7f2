// Library exports for the Framez client core
// Session state, feed synchronization, post authoring and profile editing
// over external auth / data / image-hosting services.

pub mod compose;
pub mod config;
pub mod error;
pub mod feed;
pub mod notice;
pub mod profile;
pub mod remote;
pub mod session;
pub mod validate;
