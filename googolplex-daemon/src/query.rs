/// Cleans a query as it arrives from a front end. Some clients send the whole
/// form field (`q=...` or its encoded form `q%3D...`) instead of its value.
pub fn normalize_raw_query(raw: &str) -> String {
    let mut query = raw.trim().to_string();
    if query.to_lowercase().starts_with("q%3d") {
        let spaced = query.replace('+', " ");
        if let Ok(decoded) = urlencoding::decode(&spaced) {
            query = decoded.into_owned();
        }
    }
    if query.to_lowercase().starts_with("q=") {
        query = query[2..].to_string();
    }
    query.trim().to_string()
}
