pub mod capability;
pub mod probe;
pub mod quality;
pub mod scene;

// Material assignment
pub mod material;
pub mod material_cache;

// Scroll animation
pub mod scroll;
pub mod animator;
pub mod scheduler;

pub mod config;
pub mod session;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
