// ============================================================================
// Backends
// ============================================================================
//
// Concrete change and snapshot sources. `InMemoryBackend` stands in for the
// hosted database and realtime service in tests and local tooling.
//
// ============================================================================

pub mod memory;

pub use memory::InMemoryBackend;
