// Library root: the pure half of the game mirror. Entity types, wire event
// normalization, the reducer, lineup operations and the view projection.
// Nothing in this crate performs I/O.

pub mod event;
pub mod lineup;
pub mod model;
pub mod projection;
pub mod reducer;
