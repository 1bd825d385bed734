//! Direct messaging over TCP: one envelope per connection.

pub mod listener;
pub mod sender;
