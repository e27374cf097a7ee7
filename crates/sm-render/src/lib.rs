//! Storymap renderer: hit testing and Vello painting.
//!
//! Stateless functions over the `sm-core` document. The editor crate uses
//! hit testing to resolve gestures; hosts call `paint_scene` once per frame
//! with a cleared `vello::Scene` and present it however they like.

pub mod hit;
pub mod paint;

pub use hit::{Hit, handle_anchor, hit_test, hit_test_connector, hit_test_handle, hit_test_node};
pub use paint::{ViewState, paint_background, paint_scene};
