pub mod error;
pub mod images;
pub mod provider;
pub mod routes;
pub mod rows;
pub mod state;
pub mod tokens;

#[cfg(test)]
mod test_support;
