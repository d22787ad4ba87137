pub mod extractor;
pub mod jwt;
pub mod qr_token;
pub mod test_utils;
