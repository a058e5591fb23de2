pub mod user;
pub mod catalog;
pub mod stock;
pub mod request;
pub mod notification;

// Re-export only the types we actually use
pub use user::{CreateUser, LoginRequest, Role, User, UserResponse};
pub use catalog::{Category, Item, ItemWithCategory, Shelter, Warehouse};
pub use stock::{Stock, StockRow, StockView};
pub use request::{CreateRequest, RequestLineRow, RequestRow, RequestStatus, RequestView};
pub use notification::Notification;
