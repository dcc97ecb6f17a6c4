pub mod revoke;
pub mod whoami;
