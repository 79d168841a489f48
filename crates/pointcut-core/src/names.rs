//! Conversions between internal (`java/lang/String`) and dotted
//! (`java.lang.String`) class names.
//!
//! Nested classes keep their `$` separator in both forms, which keeps the
//! conversion lossless in both directions.

pub fn internal_to_dotted(name: &str) -> String {
    name.replace('/', ".")
}

pub fn dotted_to_internal(name: &str) -> String {
    name.replace('.', "/")
}

/// The unqualified class name (`java/util/Map$Entry` -> `Map$Entry`).
pub fn simple_name(name: &str) -> &str {
    name.rsplit(['/', '.']).next().unwrap_or(name)
}
