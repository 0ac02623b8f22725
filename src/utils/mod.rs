pub mod editor;
pub mod logging;
pub mod url;
#[cfg(test)]
pub mod test_utils;
