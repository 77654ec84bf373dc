//! Deterministic model ids derived from a model's origin path.

/// Last segment of a filesystem path or URL, ignoring trailing separators
/// and any query string.
pub fn model_name_from_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("model")
        .to_string()
}

/// 32-bit rolling hash over the UTF-16 code units of `s`
/// (`hash = (hash << 5) - hash + unit`, wrapping), returned as an absolute value.
/// The shift form is authoritative: the multiplier is 31, not 30.
pub fn path_hash(s: &str) -> u32 {
    let hash = s.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    });
    hash.unsigned_abs()
}

/// `<basename-without-extension>-<8 lowercase hex digits>`.
pub fn derive_model_id(path: &str) -> String {
    let name = model_name_from_path(path);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name.as_str(),
    };
    format!("{}-{:08x}", stem, path_hash(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_path() {
        assert_eq!(model_name_from_path("./m.gguf"), "m.gguf");
        assert_eq!(model_name_from_path("C:\\models\\llama.gguf"), "llama.gguf");
        assert_eq!(model_name_from_path("https://host/repo/phi-2.Q4.gguf?download=1"), "phi-2.Q4.gguf");
        assert_eq!(model_name_from_path("models/dir/"), "dir");
        assert_eq!(model_name_from_path(""), "model");
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(path_hash(""), 0);
        assert_eq!(path_hash("a"), 97);
        assert_eq!(path_hash("ab"), 97 * 31 + 98);
        // Overflows i32 and must wrap rather than panic.
        assert_eq!(path_hash("/a/very/long/path/to/some/model.gguf"), path_hash("/a/very/long/path/to/some/model.gguf"));
    }

    #[test]
    fn test_derived_id_shape() {
        let id = derive_model_id("./m.gguf");
        let (stem, hex) = id.rsplit_once('-').unwrap();
        assert_eq!(stem, "m");
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, "m-1d73c953");
    }

    #[test]
    fn test_derived_id_keeps_inner_dots() {
        assert!(derive_model_id("/m/phi-2.Q4_K_M.gguf").starts_with("phi-2.Q4_K_M-"));
        assert!(derive_model_id("/m/.hidden").starts_with(".hidden-"));
    }

    #[test]
    fn test_distinct_paths_get_distinct_ids() {
        let paths = [
            "./m.gguf",
            "../m.gguf",
            "/models/m.gguf",
            "/models/llama-7b.gguf",
            "/models/llama-13b.gguf",
            "https://example.com/models/m.gguf",
        ];
        let ids: std::collections::HashSet<_> = paths.iter().map(|p| derive_model_id(p)).collect();
        assert_eq!(ids.len(), paths.len());
    }
}
