//! Order Store component: the [`Order`] record, its validation rules,
//! and the [`OrderStore`] trait with Postgres / in-memory backings.

pub mod model;
pub mod store;

pub use model::{
    AuditRecord, CreateOrderInput, Order, OrderFilters, OrderStatus, OrderUpdate,
    OrderValidationError, ProgressStatus,
};
pub use store::{InMemoryOrderStore, OrderStore, PgOrderStore};
