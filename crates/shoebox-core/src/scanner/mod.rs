mod walk;

pub use walk::{WalkEntry, Walker};
