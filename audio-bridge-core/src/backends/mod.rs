pub mod null;

#[cfg(test)]
pub(crate) mod scripted;
