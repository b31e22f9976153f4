pub mod click;
pub mod drag;

pub use click::{ClickDisambiguator, ClickEvent, ClickOutcome, ClickState, PendingClick};
pub use drag::{point_in_polygon, DragOutcome};
