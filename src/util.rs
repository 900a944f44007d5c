use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// First line of a multi-line node label, e.g. `"ssh\n(22)"` -> `"ssh"`.
pub fn first_line(label: &str) -> &str {
    label.lines().next().unwrap_or(label)
}

/// Deterministic pair in `[-1, 1]` derived from `id`.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

pub fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_of_label() {
        assert_eq!(first_line("ssh\n(22)"), "ssh");
        assert_eq!(first_line("10.0.0.5"), "10.0.0.5");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn stable_pair_is_deterministic_and_bounded() {
        let first = stable_pair("port_22");
        assert_eq!(first, stable_pair("port_22"));
        assert_ne!(first, stable_pair("port_80"));
        assert!((-1.0..=1.0).contains(&first.0));
        assert!((-1.0..=1.0).contains(&first.1));
    }

    #[test]
    fn plural_picks_form() {
        assert_eq!(plural(1, "port", "ports"), "1 port");
        assert_eq!(plural(3, "port", "ports"), "3 ports");
    }
}
