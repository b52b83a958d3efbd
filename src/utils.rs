use once_cell::sync::Lazy;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("friendlychat-io")
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn spawn_async<F>(fut: F) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    RUNTIME.spawn(fut)
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    // Database paths are joined relative to the root, so it must end in '/'.
    if with_scheme.ends_with('/') {
        with_scheme
    } else {
        format!("{}/", with_scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_trailing_slash() {
        assert_eq!(
            normalize_url("  demo.firebaseio.com "),
            "https://demo.firebaseio.com/"
        );
        assert_eq!(
            normalize_url("http://localhost:9000/"),
            "http://localhost:9000/"
        );
        assert_eq!(normalize_url("   "), "");
    }
}
