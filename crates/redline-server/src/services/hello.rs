pub const GREETING: &str = "Hello, World!\n";

/// `GET /hello`
pub async fn hello() -> &'static str {
    GREETING
}
