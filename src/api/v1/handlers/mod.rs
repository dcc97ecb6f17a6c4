pub mod health;
pub mod revoke;
pub mod whoami;
