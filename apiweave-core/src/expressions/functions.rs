use std::sync::LazyLock;

use regex::Regex;

use super::ValueStringError;

static BOUNDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(-?\d*)(:?)(-?\d*)\]$").expect("valid regex"));

/// Slice bounds in `[a]` / `[a:]` / `[a:b]` / `[:b]` form. Negative indices
/// count from the end; a range end is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceBounds {
    Index(i64),
    Range(i64, Option<i64>),
}

impl SliceBounds {
    pub fn parse(text: &str) -> Result<Self, ValueStringError> {
        let caps = BOUNDS_RE
            .captures(text)
            .ok_or_else(|| ValueStringError::InvalidBounds(text.to_string()))?;
        let start: i64 = match &caps[1] {
            "" => 0,
            s => s
                .parse()
                .map_err(|_| ValueStringError::InvalidBounds(text.to_string()))?,
        };
        if &caps[2] != ":" {
            return Ok(Self::Index(start));
        }
        let end = match &caps[3] {
            "" => None,
            s => Some(
                s.parse()
                    .map_err(|_| ValueStringError::InvalidBounds(text.to_string()))?,
            ),
        };
        Ok(Self::Range(start, end))
    }

    /// Resolve against a sequence length. `Index` yields a single position,
    /// `Range` a half-open start..end window.
    fn window(&self, len: usize) -> Result<(usize, usize), ValueStringError> {
        let len_i = len as i64;
        match *self {
            Self::Index(i) => {
                let idx = if i < 0 { len_i + i } else { i };
                if idx < 0 || idx >= len_i {
                    return Err(ValueStringError::IndexOutOfRange { index: i, len });
                }
                Ok((idx as usize, idx as usize + 1))
            }
            Self::Range(start, end) => {
                let s = if start < 0 { len_i + start } else { start }.clamp(0, len_i);
                let e = match end {
                    None => len_i,
                    Some(e) if e < 0 => len_i + e,
                    Some(e) => e + 1,
                }
                .clamp(0, len_i);
                Ok((s as usize, (e.max(s)) as usize))
            }
        }
    }
}

/// A post-processing function applied to an already-resolved string.
#[derive(Debug, Clone)]
pub enum PostFn {
    Split { bounds: SliceBounds, separator: String },
    Sub { bounds: SliceBounds },
    Replace { search: String, replace: String },
    Upper,
    Lower,
    Trim,
    TagPath,
}

impl PostFn {
    pub fn parse(piece: &str) -> Result<Self, ValueStringError> {
        let mut args = piece.split("::").map(str::trim);
        let name = args.next().unwrap_or_default();
        let args: Vec<&str> = args.collect();

        match name.to_ascii_lowercase().as_str() {
            "split" => {
                let bounds = args
                    .first()
                    .ok_or(ValueStringError::MissingArgument("split"))?;
                let separator = args.get(1).unwrap_or(&"/").to_string();
                Ok(Self::Split {
                    bounds: SliceBounds::parse(bounds)?,
                    separator,
                })
            }
            "sub" => {
                let bounds = args.first().ok_or(ValueStringError::MissingArgument("sub"))?;
                Ok(Self::Sub {
                    bounds: SliceBounds::parse(bounds)?,
                })
            }
            "replace" => {
                if args.len() < 2 {
                    return Err(ValueStringError::MissingArgument("replace"));
                }
                Ok(Self::Replace {
                    search: args[0].to_string(),
                    replace: args[1].to_string(),
                })
            }
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            "trim" => Ok(Self::Trim),
            "tagpath" => Ok(Self::TagPath),
            other => Err(ValueStringError::UnknownFunction(other.to_string())),
        }
    }

    pub fn apply(&self, value: String) -> Result<String, ValueStringError> {
        match self {
            Self::Split { bounds, separator } => {
                let parts: Vec<&str> = value.split(separator.as_str()).collect();
                let (start, end) = bounds.window(parts.len())?;
                Ok(parts[start..end].join(separator))
            }
            Self::Sub { bounds } => {
                let chars: Vec<char> = value.chars().collect();
                let (start, end) = bounds.window(chars.len())?;
                Ok(chars[start..end].iter().collect())
            }
            Self::Replace { search, replace } => Ok(value.replace(search, replace)),
            Self::Upper => Ok(value.to_uppercase()),
            Self::Lower => Ok(value.to_lowercase()),
            Self::Trim => Ok(value.trim().to_string()),
            Self::TagPath => Ok(tag_path(&value)),
        }
    }
}

/// Rewrite a normalized JSONPath like `$['store']['book'][0]['title']` into
/// the slash-delimited form `store/book/0/title`.
fn tag_path(value: &str) -> String {
    let Some(stripped) = value.strip_prefix('$') else {
        return value.to_string();
    };
    stripped
        .replace("']['", "/")
        .replace("'][", "/")
        .replace("]['", "/")
        .replace("][", "/")
        .replace("['", "")
        .replace('[', "")
        .replace("']", "")
        .replace(']', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_forms() {
        assert_eq!(SliceBounds::parse("[2]").unwrap(), SliceBounds::Index(2));
        assert_eq!(
            SliceBounds::parse("[-1]").unwrap(),
            SliceBounds::Index(-1)
        );
        assert_eq!(
            SliceBounds::parse("[1:]").unwrap(),
            SliceBounds::Range(1, None)
        );
        assert_eq!(
            SliceBounds::parse("[1:3]").unwrap(),
            SliceBounds::Range(1, Some(3))
        );
        assert_eq!(
            SliceBounds::parse("[:-2]").unwrap(),
            SliceBounds::Range(0, Some(-2))
        );
        assert!(SliceBounds::parse("1:3").is_err());
    }

    #[test]
    fn split_inclusive_range() {
        let f = PostFn::parse("split::[0:1]::/").unwrap();
        assert_eq!(f.apply("a/b/c".to_string()).unwrap(), "a/b");
    }

    #[test]
    fn split_negative_end_excludes_from_end() {
        let f = PostFn::parse("split::[0:-1]::/").unwrap();
        assert_eq!(f.apply("a/b/c".to_string()).unwrap(), "a/b");
    }

    #[test]
    fn split_index_out_of_range() {
        let f = PostFn::parse("split::[5]::/").unwrap();
        assert!(f.apply("a/b".to_string()).is_err());
    }

    #[test]
    fn sub_slices_characters() {
        let f = PostFn::parse("sub::[1:3]").unwrap();
        assert_eq!(f.apply("abcdef".to_string()).unwrap(), "bcd");

        let f = PostFn::parse("sub::[-1]").unwrap();
        assert_eq!(f.apply("abcdef".to_string()).unwrap(), "f");
    }

    #[test]
    fn tag_path_rewrites_bracket_notation() {
        assert_eq!(tag_path("$['a']['b'][0]"), "a/b/0");
        assert_eq!(tag_path("$[0]['x']"), "0/x");
        assert_eq!(tag_path("plain"), "plain");
    }
}
