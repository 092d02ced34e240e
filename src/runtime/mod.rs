//! Runtime layer.
//!
//! Hosts the control loop, the single sequencing flow every user callback
//! runs on. Keeping the task body here isolates async/scheduling behavior
//! from the control- and data-plane modules, which only ever touch queues
//! and stop signals.

pub(crate) mod control_loop;
