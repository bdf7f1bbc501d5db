pub mod credentials;
pub mod jail;
pub mod puzzle;
pub mod redirect;
pub mod token;
