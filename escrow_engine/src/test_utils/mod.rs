//! Helpers for tests and tooling: throwaway databases, catalog seeding and an in-memory payment provider.
pub mod fixtures;
pub mod mock_provider;
pub mod prepare_env;
