use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::net::IpAddr;

/// Random alphanumeric identifier of `len` characters.
pub fn uid(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Password injected through user-data when the caller gave none.
pub fn generate_password() -> String {
    uid(16)
}

/// Random permutation of `range`, used to probe for free numeric IDs.
pub fn shuffled(range: std::ops::Range<u32>) -> Vec<u32> {
    let mut values: Vec<u32> = range.collect();
    values.shuffle(&mut rand::thread_rng());
    values
}

/// True when every element of `subset` is contained in `set`.
pub fn is_subset<S: AsRef<str>>(set: &[S], subset: &[S]) -> bool {
    let set: HashSet<&str> = set.iter().map(AsRef::as_ref).collect();
    subset.iter().all(|item| set.contains(item.as_ref()))
}

/// True for RFC 1918 IPv4 addresses.
pub fn is_private_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private(),
        _ => false,
    }
}

/// 4 or 6, or 0 when `ip` does not parse.
pub fn ip_version(ip: &str) -> u8 {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => 4,
        Ok(IpAddr::V6(v6)) if v6.to_ipv4_mapped().is_some() => 4,
        Ok(IpAddr::V6(_)) => 6,
        Err(_) => 0,
    }
}

/// Picks the preferred public and private address out of `ips`.
///
/// IPv4 beats IPv6 on each side; the first address of a version wins.
pub fn pick_addresses<'a>(ips: impl IntoIterator<Item = &'a str>) -> (String, String) {
    let mut public: Option<&str> = None;
    let mut private: Option<&str> = None;
    for ip in ips {
        let version = ip_version(ip);
        if version == 0 {
            continue;
        }
        let slot = if is_private_ip(ip) {
            &mut private
        } else {
            &mut public
        };
        let replace = match *slot {
            None => true,
            Some(current) => version == 4 && ip_version(current) == 6,
        };
        if replace {
            *slot = Some(ip);
        }
    }
    (
        public.unwrap_or_default().to_string(),
        private.unwrap_or_default().to_string(),
    )
}
