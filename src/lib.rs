pub mod channels;
pub mod chunker;
pub mod config;
pub mod history;
pub mod persona;
pub mod relay;
pub mod responder;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
