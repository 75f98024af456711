pub mod diagnose;
pub mod init;
pub mod routes;
