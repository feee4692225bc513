pub mod capture;
pub mod detection;
pub mod scan;
pub mod shared;
pub mod ui;
pub mod upload;

#[cfg(test)]
mod testing;
