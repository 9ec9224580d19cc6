//! Deterministic unique-name generation
//!
//! Logical ids and generated physical names are derived from construct path
//! components. A single short component is used as-is; anything else gets the
//! components joined plus an 8-hex-digit path hash so renames higher up the
//! tree never collide two different paths into the same name.

const HASH_LEN: usize = 8;
const PATH_SEP: &str = "/";

/// Generate a unique name from path components.
///
/// The hash is computed over the full, un-deduplicated component path, so two
/// different paths always produce different names even when their human
/// readable parts collide. Names longer than `max_length` are truncated in
/// the middle, keeping the hash intact.
pub fn make_unique_resource_name(
    components: &[&str],
    max_length: usize,
    separator: &str,
) -> String {
    // Top-level resources simply use their own name when it fits.
    if components.len() == 1 && components[0].len() <= max_length {
        return components[0].to_string();
    }

    let hash = path_hash(components);

    // Adjacent duplicate components add nothing for a human reader.
    let mut parts: Vec<&str> = Vec::new();
    for c in components {
        if parts.last() != Some(c) {
            parts.push(c);
        }
    }

    let mut human = parts.join(separator);
    human.push_str(separator);

    let max_human = max_length.saturating_sub(HASH_LEN);
    if human.len() > max_human {
        human = split_in_middle(&human, max_human);
    }
    format!("{}{}", human, hash)
}

/// 8 uppercase hex digits derived from the joined path.
fn path_hash(components: &[&str]) -> String {
    let digest = fnv1a64(components.join(PATH_SEP).as_bytes());
    format!("{:016X}", digest)[..HASH_LEN].to_string()
}

/// FNV-1a, 64 bit. Stable across platforms and releases, which is all the
/// naming contract needs.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn split_in_middle(s: &str, max_length: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_length {
        return s.to_string();
    }
    let head = max_length / 2;
    let tail = max_length - head;
    let mut out: String = chars[..head].iter().collect();
    out.extend(&chars[chars.len() - tail..]);
    out
}
