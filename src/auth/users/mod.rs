pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use self::{
    memory::MemoryUserStore,
    models::{AccountState, NewUser, UpdateUser, User},
    postgres::PgUserStore,
    store::{Credentials, UserStore, parse_id},
};
