// dtbackuptool/src/cloud/link.rs
use url::Url;

const YANDEX_DISK_CANONICAL: &str = "https://disk.yandex.ru/d";

fn is_yandex_disk_host(host: &str) -> bool {
    host == "yadi.sk" || host.starts_with("disk.yandex.")
}

/// Rewrites known share-link shapes to their canonical public form and
/// returns anything else unchanged (trimmed). Applying it twice gives the
/// same result as applying it once.
///
/// Yandex.Disk public links (`disk.yandex.<tld>/d/<hash>` or
/// `yadi.sk/d/<hash>`) become `https://disk.yandex.ru/d/<hash>`.
pub fn normalize_share_link(link: &str) -> String {
    let link = link.trim();
    let Ok(url) = Url::parse(link) else {
        return link.to_string();
    };

    let is_yandex = url.host_str().is_some_and(is_yandex_disk_host);
    if is_yandex {
        let mut segments = url.path_segments().into_iter().flatten().filter(|s| !s.is_empty());
        if let (Some("d"), Some(hash)) = (segments.next(), segments.next()) {
            return format!("{}/{}", YANDEX_DISK_CANONICAL, hash);
        }
    }

    link.to_string()
}
