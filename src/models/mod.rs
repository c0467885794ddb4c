pub mod events;

pub use events::{OrderPlaced, OrderReady};
