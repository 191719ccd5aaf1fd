//! HTTP request handlers.

pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

pub use health::{debug_vars, healthcheck};
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use tokens::{create_authentication_token, resend_activation_token};
pub use users::{activate_user, register_user};
