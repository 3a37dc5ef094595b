//! Splitting of full worker identifiers (`<wallet><separator><worker>`).

pub const DEFAULT_WORKER_SEPARATOR: &str = ".";

/// Wallet part: everything before the first separator.
pub fn wallet_from_workerfull<'a>(workerfull: &'a str, separator: &str) -> &'a str {
    match workerfull.split_once(separator) {
        Some((wallet, _)) => wallet,
        None => workerfull,
    }
}

/// Short worker name: the segment after the first separator, or empty when
/// there is no separator.
pub fn worker_from_workerfull<'a>(workerfull: &'a str, separator: &str) -> &'a str {
    match workerfull.split_once(separator) {
        Some((_, rest)) => rest.split(separator).next().unwrap_or_default(),
        None => "",
    }
}
