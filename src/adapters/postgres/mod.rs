//! PostgreSQL adapters.
//!
//! Schema lives in `migrations/` and is applied by `sqlx::migrate!` at
//! startup when `database.run_migrations` is set.

mod identity_store;

pub use identity_store::PostgresIdentityStore;
