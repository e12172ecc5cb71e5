use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::{
    clean, parse_build, parse_numeric, parse_pre_release, Identifier, Version, BUILD, NUMERIC,
    PRE_RELEASE,
};

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidRange(String);

impl InvalidRange {
    pub fn input(&self) -> &str {
        &self.0
    }
}

impl std::error::Error for InvalidRange {}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version range: {:?}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Operator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
        }
    }

    /// Splits a leading operator off `token`. Longer operators are matched first.
    fn split(token: &str) -> (Option<Operator>, &str) {
        for operator in [
            Operator::Le,
            Operator::Ge,
            Operator::Lt,
            Operator::Gt,
            Operator::Eq,
        ] {
            if let Some(rest) = token.strip_prefix(operator.as_str()) {
                return (Some(operator), rest);
            }
        }
        (None, token)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub operator: Operator,
    pub version: Version,
}

impl Comparator {
    pub const fn new(operator: Operator, version: Version) -> Self {
        Self { operator, version }
    }

    /// The comparator `<0.0.0-0`, which no version satisfies.
    pub fn null_set() -> Self {
        Self::new(
            Operator::Lt,
            version_with_pre(0, 0, 0, vec![Identifier::Numeric(0)]),
        )
    }

    pub fn is_null_set(&self) -> bool {
        *self == Self::null_set()
    }

    pub fn test(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Lt => version < &self.version,
            Operator::Le => version <= &self.version,
            Operator::Gt => version > &self.version,
            Operator::Ge => version >= &self.version,
            Operator::Eq => version == &self.version,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// A set of version requirements: the alternatives separated by `||` are OR'ed, the comparators
/// within an alternative are AND'ed. An alternative without comparators matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    set: Vec<Vec<Comparator>>,
}

impl Range {
    pub fn parse(raw: &str) -> Result<Self, InvalidRange> {
        let mut set = raw
            .split("||")
            .map(|alternative| parse_alternative(alternative.trim(), raw))
            .collect::<Result<Vec<_>, _>>()?;

        // Null sets only matter if there is nothing else.
        if set.iter().any(|alternative| !is_null_set(alternative)) {
            set.retain(|alternative| !is_null_set(alternative));
        } else {
            set.truncate(1);
        }

        Ok(Self { set })
    }

    /// A range that matches every non pre-release version.
    pub fn any() -> Self {
        Self {
            set: vec![Vec::new()],
        }
    }

    pub fn alternatives(&self) -> &[Vec<Comparator>] {
        &self.set
    }

    /// Returns true if no version can satisfy this range.
    pub fn is_null_set(&self) -> bool {
        self.set.iter().all(|alternative| is_null_set(alternative))
    }

    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        self.set
            .iter()
            .any(|alternative| alternative_is_satisfied_by(alternative, version))
    }
}

fn is_null_set(alternative: &[Comparator]) -> bool {
    alternative.iter().any(Comparator::is_null_set)
}

fn alternative_is_satisfied_by(alternative: &[Comparator], version: &Version) -> bool {
    if !alternative.iter().all(|comparator| comparator.test(version)) {
        return false;
    }

    // A pre-release version is only allowed if a comparator on the same `major.minor.patch` opts
    // into pre-releases.
    if version.is_pre_release() {
        return alternative.iter().any(|comparator| {
            comparator.version.is_pre_release() && comparator.version.same_core(version)
        });
    }

    true
}

impl FromStr for Range {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, alternative) in self.set.iter().enumerate() {
            if index > 0 {
                f.write_str(" || ")?;
            }
            if alternative.is_empty() {
                f.write_str("*")?;
            }
            for (index, comparator) in alternative.iter().enumerate() {
                if index > 0 {
                    f.write_str(" ")?;
                }
                comparator.fmt(f)?;
            }
        }
        Ok(())
    }
}

static X_RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    const X: &str = r"[xX*]";
    Regex::new(&format!(
        r"^({NUMERIC}|{X})(?:\.({NUMERIC}|{X})(?:\.({NUMERIC}|{X})(?:-({PRE_RELEASE}))?(?:\+({BUILD}))?)?)?$"
    ))
    .unwrap()
});

static HYPHEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+-\s+(\S+)$").unwrap());

/// A possibly incomplete version such as `1`, `1.x` or `1.2.*`. Once a component is missing, the
/// components after it are ignored.
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Vec<Identifier>,
    build: Vec<String>,
}

impl Partial {
    fn parse(value: &str, raw: &str) -> Result<Self, InvalidRange> {
        let invalid = || InvalidRange(raw.to_owned());
        let captures = X_RANGE_REGEX.captures(clean(value)).ok_or_else(invalid)?;

        let component = |index: usize| -> Result<Option<u64>, InvalidRange> {
            match captures.get(index).map(|m| m.as_str()) {
                None | Some("x" | "X" | "*") => Ok(None),
                Some(value) => parse_numeric(value, raw).map(Some).map_err(|_| invalid()),
            }
        };

        let major = component(1)?;
        let minor = major.and(component(2)?);
        let patch = minor.and(component(3)?);

        Ok(Self {
            major,
            minor,
            patch,
            pre: captures
                .get(4)
                .map(|m| parse_pre_release(m.as_str(), raw))
                .transpose()
                .map_err(|_| invalid())?
                .unwrap_or_default(),
            build: captures
                .get(5)
                .map(|m| parse_build(m.as_str()))
                .unwrap_or_default(),
        })
    }

    fn is_any_x(&self) -> bool {
        self.patch.is_none()
    }
}

fn version_with_pre(major: u64, minor: u64, patch: u64, pre: Vec<Identifier>) -> Version {
    Version {
        pre,
        ..Version::new(major, minor, patch)
    }
}

fn ge(major: u64, minor: u64, patch: u64) -> Comparator {
    Comparator::new(Operator::Ge, Version::new(major, minor, patch))
}

/// `<major.minor.patch-0`, an exclusive upper bound that also excludes the pre-releases of the
/// bound itself.
fn lt_pre_zero(major: u64, minor: u64, patch: u64) -> Comparator {
    Comparator::new(
        Operator::Lt,
        version_with_pre(major, minor, patch, vec![Identifier::Numeric(0)]),
    )
}

fn increment(value: u64, raw: &str) -> Result<u64, InvalidRange> {
    value.checked_add(1).ok_or_else(|| InvalidRange(raw.to_owned()))
}

fn parse_alternative(alternative: &str, raw: &str) -> Result<Vec<Comparator>, InvalidRange> {
    let mut comparators = Vec::new();

    if let Some(captures) = HYPHEN_REGEX.captures(alternative) {
        let from = Partial::parse(&captures[1], raw)?;
        let to = Partial::parse(&captures[2], raw)?;
        comparators.extend(expand_hyphen(from, to, raw)?);
    } else {
        for token in tokens(alternative, raw)? {
            comparators.extend(expand(&token, raw)?);
        }
    }

    if comparators.iter().any(Comparator::is_null_set) {
        return Ok(vec![Comparator::null_set()]);
    }

    Ok(comparators)
}

/// Splits an alternative on whitespace, joining lone operators such as the `>=` in `>= 1.2.3`
/// with the version that follows them.
fn tokens(alternative: &str, raw: &str) -> Result<Vec<String>, InvalidRange> {
    const OPERATORS: &[&str] = &["<", "<=", ">", ">=", "=", "~", "~>", "^"];

    let mut out = Vec::new();
    let mut pending: Option<&str> = None;
    for word in alternative.split_whitespace() {
        if let Some(operator) = pending.take() {
            out.push(format!("{operator}{word}"));
        } else if OPERATORS.contains(&word) {
            pending = Some(word);
        } else {
            out.push(word.to_owned());
        }
    }

    if pending.is_some() {
        return Err(InvalidRange(raw.to_owned()));
    }

    Ok(out)
}

fn expand(token: &str, raw: &str) -> Result<Vec<Comparator>, InvalidRange> {
    if let Some(rest) = token.strip_prefix("~>").or_else(|| token.strip_prefix('~')) {
        return expand_tilde(Partial::parse(rest, raw)?, raw);
    }
    if let Some(rest) = token.strip_prefix('^') {
        return expand_caret(Partial::parse(rest, raw)?, raw);
    }
    let (operator, rest) = Operator::split(token);
    expand_x_range(operator, Partial::parse(rest, raw)?, raw)
}

/// `~1.2.3` := `>=1.2.3 <1.3.0-0`, `~1.2` := `>=1.2.0 <1.3.0-0`, `~1` := `>=1.0.0 <2.0.0-0`.
fn expand_tilde(partial: Partial, raw: &str) -> Result<Vec<Comparator>, InvalidRange> {
    let Some(major) = partial.major else {
        return Ok(Vec::new());
    };
    let Some(minor) = partial.minor else {
        return Ok(vec![ge(major, 0, 0), lt_pre_zero(increment(major, raw)?, 0, 0)]);
    };
    let upper = lt_pre_zero(major, increment(minor, raw)?, 0);
    let Some(patch) = partial.patch else {
        return Ok(vec![ge(major, minor, 0), upper]);
    };
    Ok(vec![
        Comparator::new(
            Operator::Ge,
            version_with_pre(major, minor, patch, partial.pre),
        ),
        upper,
    ])
}

/// Allows changes that do not modify the left-most non-zero component: `^1.2.3` := `>=1.2.3
/// <2.0.0-0`, `^0.2.3` := `>=0.2.3 <0.3.0-0`, `^0.0.3` := `>=0.0.3 <0.0.4-0`.
fn expand_caret(partial: Partial, raw: &str) -> Result<Vec<Comparator>, InvalidRange> {
    let Some(major) = partial.major else {
        return Ok(Vec::new());
    };
    let Some(minor) = partial.minor else {
        return Ok(vec![ge(major, 0, 0), lt_pre_zero(increment(major, raw)?, 0, 0)]);
    };
    let Some(patch) = partial.patch else {
        let upper = if major == 0 {
            lt_pre_zero(major, increment(minor, raw)?, 0)
        } else {
            lt_pre_zero(increment(major, raw)?, 0, 0)
        };
        return Ok(vec![ge(major, minor, 0), upper]);
    };

    let upper = match (major, minor) {
        (0, 0) => lt_pre_zero(0, 0, increment(patch, raw)?),
        (0, _) => lt_pre_zero(0, increment(minor, raw)?, 0),
        _ => lt_pre_zero(increment(major, raw)?, 0, 0),
    };
    Ok(vec![
        Comparator::new(
            Operator::Ge,
            version_with_pre(major, minor, patch, partial.pre),
        ),
        upper,
    ])
}

/// Expands `*`, `1.x`, `1.2` and friends, optionally prefixed by an operator. Plain versions
/// become a single comparator.
fn expand_x_range(
    operator: Option<Operator>,
    partial: Partial,
    raw: &str,
) -> Result<Vec<Comparator>, InvalidRange> {
    let Some(mut major) = partial.major else {
        return Ok(match operator {
            Some(Operator::Lt | Operator::Gt) => vec![Comparator::null_set()],
            _ => Vec::new(),
        });
    };

    let operator = match operator {
        Some(Operator::Eq) if partial.is_any_x() => None,
        other => other,
    };

    match (operator, partial.minor, partial.patch) {
        (Some(operator), minor_or_x, None) => {
            let mut minor = minor_or_x.unwrap_or(0);
            let operator = match operator {
                Operator::Gt => {
                    if minor_or_x.is_none() {
                        major = increment(major, raw)?;
                        minor = 0;
                    } else {
                        minor = increment(minor, raw)?;
                    }
                    Operator::Ge
                }
                Operator::Le => {
                    if minor_or_x.is_none() {
                        major = increment(major, raw)?;
                    } else {
                        minor = increment(minor, raw)?;
                    }
                    Operator::Lt
                }
                other => other,
            };
            Ok(vec![if operator == Operator::Lt {
                lt_pre_zero(major, minor, 0)
            } else {
                Comparator::new(operator, Version::new(major, minor, 0))
            }])
        }
        (_, None, _) => Ok(vec![ge(major, 0, 0), lt_pre_zero(increment(major, raw)?, 0, 0)]),
        (None, Some(minor), None) => Ok(vec![
            ge(major, minor, 0),
            lt_pre_zero(major, increment(minor, raw)?, 0),
        ]),
        (operator, Some(minor), Some(patch)) => Ok(vec![Comparator::new(
            operator.unwrap_or(Operator::Eq),
            Version {
                major,
                minor,
                patch,
                pre: partial.pre,
                build: partial.build,
            },
        )]),
    }
}

/// `1.2.3 - 2.3.4` := `>=1.2.3 <=2.3.4`, where a partial upper bound is exclusive of the next
/// version: `1.2 - 2.3` := `>=1.2.0 <2.4.0-0`.
fn expand_hyphen(from: Partial, to: Partial, raw: &str) -> Result<Vec<Comparator>, InvalidRange> {
    let mut out = Vec::with_capacity(2);

    if let Some(major) = from.major {
        out.push(Comparator::new(
            Operator::Ge,
            version_with_pre(
                major,
                from.minor.unwrap_or(0),
                from.patch.unwrap_or(0),
                if from.patch.is_some() {
                    from.pre
                } else {
                    Vec::new()
                },
            ),
        ));
    }

    if let Some(major) = to.major {
        out.push(match (to.minor, to.patch) {
            (None, _) => lt_pre_zero(increment(major, raw)?, 0, 0),
            (Some(minor), None) => lt_pre_zero(major, increment(minor, raw)?, 0),
            (Some(minor), Some(patch)) => {
                Comparator::new(Operator::Le, version_with_pre(major, minor, patch, to.pre))
            }
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expansion(raw: &str) -> String {
        Range::parse(raw).unwrap().to_string()
    }

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    #[test]
    fn shorthand_expansion_works() {
        for (raw, expected) in [
            ("", "*"),
            ("*", "*"),
            ("x", "*"),
            (">=*", "*"),
            ("=*", "*"),
            ("1", ">=1.0.0 <2.0.0-0"),
            ("1.x", ">=1.0.0 <2.0.0-0"),
            ("1.2", ">=1.2.0 <1.3.0-0"),
            ("1.2.X", ">=1.2.0 <1.3.0-0"),
            ("1.x.3", ">=1.0.0 <2.0.0-0"),
            ("1.2.3", "=1.2.3"),
            ("=1.2.3", "=1.2.3"),
            ("v1.2.3", "=1.2.3"),
            ("~1.2.3", ">=1.2.3 <1.3.0-0"),
            ("~>1.2.3", ">=1.2.3 <1.3.0-0"),
            ("~1.2", ">=1.2.0 <1.3.0-0"),
            ("~1", ">=1.0.0 <2.0.0-0"),
            ("~0.2.3", ">=0.2.3 <0.3.0-0"),
            ("~1.2.3-beta.2", ">=1.2.3-beta.2 <1.3.0-0"),
            ("^1.2.3", ">=1.2.3 <2.0.0-0"),
            ("^0.2.3", ">=0.2.3 <0.3.0-0"),
            ("^0.0.3", ">=0.0.3 <0.0.4-0"),
            ("^1.2.3-beta.2", ">=1.2.3-beta.2 <2.0.0-0"),
            ("^0.0.3-beta", ">=0.0.3-beta <0.0.4-0"),
            ("^1.2.x", ">=1.2.0 <2.0.0-0"),
            ("^0.0.x", ">=0.0.0 <0.1.0-0"),
            ("^0.0", ">=0.0.0 <0.1.0-0"),
            ("^1.x", ">=1.0.0 <2.0.0-0"),
            ("^0.x", ">=0.0.0 <1.0.0-0"),
            ("^0", ">=0.0.0 <1.0.0-0"),
            ("1.2.3 - 2.3.4", ">=1.2.3 <=2.3.4"),
            ("1.2 - 2.3.4", ">=1.2.0 <=2.3.4"),
            ("1.2.3 - 2.3", ">=1.2.3 <2.4.0-0"),
            ("1.2.3 - 2", ">=1.2.3 <3.0.0-0"),
            ("* - 2", "<3.0.0-0"),
            (">1", ">=2.0.0"),
            (">1.2", ">=1.3.0"),
            ("<=1.2", "<1.3.0-0"),
            ("<=1", "<2.0.0-0"),
            ("<1.2", "<1.2.0-0"),
            (">=1.2", ">=1.2.0"),
            (">=0.10.0", ">=0.10.0"),
            (">= 1.2.3", ">=1.2.3"),
            (">=1.2.3 <2.0.0", ">=1.2.3 <2.0.0"),
            ("~ 1.2", ">=1.2.0 <1.3.0-0"),
            (">*", "<0.0.0-0"),
            ("<*", "<0.0.0-0"),
            ("<0.0.0-0", "<0.0.0-0"),
            ("1.2.3 || 2.x", "=1.2.3 || >=2.0.0 <3.0.0-0"),
            ("<* || 1.2.3", "=1.2.3"),
            (">=1.0.0 <* || <*", "<0.0.0-0"),
        ] {
            assert_eq!(expansion(raw), expected, "expansion of {raw:?}");
        }
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        for raw in [
            ">=foo",
            "1.2.3.4",
            ">=",
            "1.2.3 -",
            ">=1.2.3 - 2.0.0",
            "~",
            "^a",
            "01.2.3",
            "18446744073709551615.x",
        ] {
            assert_eq!(
                Range::parse(raw).err(),
                Some(InvalidRange(raw.to_owned())),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn satisfaction_works() {
        for (range, version, expected) in [
            ("^1.2.0", "1.2.3", true),
            ("^1.2.0", "2.0.0", false),
            ("^1.2.0", "1.1.9", false),
            ("^1.2.0", "1.3.0-beta", false),
            ("^1.2.0", "2.0.0-0", false),
            (">=1.2.3-beta", "1.2.3-beta", true),
            (">=1.2.3-beta", "1.2.3-beta.1", true),
            (">=1.2.3-beta", "1.2.3-alpha", false),
            (">=1.2.3-beta", "1.2.4-beta", false),
            (">=1.2.3-beta", "1.2.4", true),
            ("~1.2.3", "1.2.9", true),
            ("~1.2.3", "1.3.0", false),
            ("1.2.3 - 2.3.4", "2.3.4", true),
            ("1.2.3 - 2.3.4", "2.3.5", false),
            ("1.2 - 2.3", "2.3.99", true),
            ("1.2.3 || >=2.1.0", "2.0.0", false),
            ("1.2.3 || >=2.1.0", "1.2.3", true),
            ("*", "0.0.1", true),
            ("*", "1.0.0-rc.1", false),
            (">*", "1.0.0", false),
            ("1.2.3", "1.2.3+build", true),
            (">=0.6.0", "0.8.2", true),
            (">=0.10.0", "0.8.2", false),
        ] {
            assert_eq!(
                Range::parse(range).unwrap().is_satisfied_by(&v(version)),
                expected,
                "{version} satisfies {range}"
            );
        }
    }

    #[test]
    fn equivalent_shorthands_agree() {
        let tilde = Range::parse("~1.2.3").unwrap();
        let explicit = Range::parse(">=1.2.3 <1.3.0").unwrap();
        for version in ["1.2.2", "1.2.3", "1.2.99", "1.3.0", "1.3.0-0", "1.2.4-rc.1"] {
            assert_eq!(
                tilde.is_satisfied_by(&v(version)),
                explicit.is_satisfied_by(&v(version)),
                "{version}"
            );
        }
    }

    #[test]
    fn null_set_is_detected() {
        assert!(Range::parse(">*").unwrap().is_null_set());
        assert!(!Range::parse("*").unwrap().is_null_set());
        assert!(!Range::any().is_null_set());
        assert!(Range::any().is_satisfied_by(&v("3.2.1")));
    }
}
