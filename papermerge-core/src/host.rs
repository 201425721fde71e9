/// Strips surrounding whitespace and every trailing `/` from a host value.
pub fn sanitize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_string()
}
