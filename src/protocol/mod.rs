pub mod oracle;
pub mod port;
