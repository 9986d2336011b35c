//! Operator semantics.
//!
//! Every function here takes its operands by value and returns the value to
//! push. A kind mismatch yields [`TypedValue::Undefined`]; none of them
//! panics. Strings are resolved through, and results interned into, the
//! evaluating form set's string table.

use regex::RegexBuilder;
use setup_types::{BufferEncoding, Opcode, SpanMode, StringFormat, TypedValue};
use std::cmp::Ordering;

use crate::strings::StringTable;

fn text(strings: &dyn StringTable, value: &TypedValue) -> Option<String> {
    match value {
        TypedValue::String(id) => strings.get(*id).map(str::to_string),
        _ => None,
    }
}

fn new_string(strings: &mut dyn StringTable, text: &str) -> TypedValue {
    TypedValue::String(strings.intern(text))
}

// ══════════════════════════════════════════════════════════════════════════════
// Comparison
// ══════════════════════════════════════════════════════════════════════════════

/// Order two values, or `None` when their kinds cannot be compared.
///
/// - integer-like kinds (including bool, date and time) are zero-extended
///   to 64 bits and ordered by the sign of their wrapping difference;
/// - strings compare by resolved text, case-sensitively;
/// - buffers compare byte-wise, a shorter buffer with an equal prefix
///   ordering first.
pub fn compare(strings: &dyn StringTable, left: &TypedValue, right: &TypedValue) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        return Some(integer_order(l, r));
    }
    match (left, right) {
        (TypedValue::String(_), TypedValue::String(_)) => {
            Some(text(strings, left)?.cmp(&text(strings, right)?))
        }
        (TypedValue::Buffer(l), TypedValue::Buffer(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// `0` against `u64::MAX` differs by `1` and so orders greater. A gap of
/// exactly 2^63 has the same sign both ways and falls back to unsigned order.
fn integer_order(l: u64, r: u64) -> Ordering {
    match l.wrapping_sub(r) as i64 {
        i64::MIN => l.cmp(&r),
        diff => diff.cmp(&0),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Unary
// ══════════════════════════════════════════════════════════════════════════════

pub fn unary(op: &Opcode, operand: TypedValue, strings: &mut dyn StringTable) -> TypedValue {
    match op {
        Opcode::Not => match operand {
            TypedValue::Bool(b) => TypedValue::Bool(!b),
            _ => TypedValue::Undefined,
        },
        Opcode::BitwiseNot => operand
            .as_u64()
            .map_or(TypedValue::Undefined, |v| TypedValue::U64(!v)),
        Opcode::Length => match &operand {
            TypedValue::String(_) => text(strings, &operand)
                .map_or(TypedValue::Undefined, |s| TypedValue::U64(s.encode_utf16().count() as u64)),
            TypedValue::Buffer(bytes) => TypedValue::U64(bytes.len() as u64),
            _ => TypedValue::Undefined,
        },
        Opcode::ToBoolean => to_boolean(&operand, strings),
        Opcode::ToUint => to_uint(&operand, strings),
        Opcode::ToString {
            format,
            buffer_encoding,
        } => to_string(operand, *format, *buffer_encoding, strings),
        Opcode::ToUpper | Opcode::ToLower => match text(strings, &operand) {
            Some(s) if matches!(op, Opcode::ToUpper) => new_string(strings, &s.to_uppercase()),
            Some(s) => new_string(strings, &s.to_lowercase()),
            None => TypedValue::Undefined,
        },
        _ => TypedValue::Undefined,
    }
}

fn to_boolean(operand: &TypedValue, strings: &dyn StringTable) -> TypedValue {
    match operand {
        TypedValue::Bool(b) => TypedValue::Bool(*b),
        TypedValue::String(_) => match text(strings, operand) {
            Some(s) if s.eq_ignore_ascii_case("true") => TypedValue::Bool(true),
            Some(s) if s.eq_ignore_ascii_case("false") => TypedValue::Bool(false),
            _ => TypedValue::Undefined,
        },
        TypedValue::Buffer(bytes) => TypedValue::Bool(bytes.iter().any(|b| *b != 0)),
        other => other
            .as_u64()
            .map_or(TypedValue::Undefined, |v| TypedValue::Bool(v != 0)),
    }
}

fn to_uint(operand: &TypedValue, strings: &dyn StringTable) -> TypedValue {
    match operand {
        TypedValue::String(_) => {
            let Some(s) = text(strings, operand) else {
                return TypedValue::Undefined;
            };
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_or(TypedValue::Undefined, TypedValue::U64)
        }
        TypedValue::Buffer(bytes) if bytes.len() <= 8 => {
            let mut raw = [0u8; 8];
            raw[..bytes.len()].copy_from_slice(bytes);
            TypedValue::U64(u64::from_le_bytes(raw))
        }
        other => other.as_u64().map_or(TypedValue::Undefined, TypedValue::U64),
    }
}

fn to_string(
    operand: TypedValue,
    format: StringFormat,
    encoding: BufferEncoding,
    strings: &mut dyn StringTable,
) -> TypedValue {
    if matches!(operand, TypedValue::String(_)) {
        return operand;
    }
    let rendered = match &operand {
        TypedValue::Bool(b) => String::from(if *b { "True" } else { "False" }),
        TypedValue::Buffer(bytes) => match encoding {
            BufferEncoding::Ascii => bytes
                .iter()
                .take_while(|b| **b != 0)
                .map(|b| char::from(*b))
                .collect(),
            BufferEncoding::Ucs2 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .take_while(|unit| *unit != 0)
                    .collect();
                String::from_utf16_lossy(&units)
            }
        },
        other => {
            let Some(v) = other.as_u64() else {
                return TypedValue::Undefined;
            };
            match format {
                StringFormat::UnsignedDecimal => v.to_string(),
                StringFormat::SignedDecimal => (v as i64).to_string(),
                StringFormat::LowerHex => format!("{v:x}"),
                StringFormat::UpperHex => format!("{v:X}"),
            }
        }
    };
    new_string(strings, &rendered)
}

// ══════════════════════════════════════════════════════════════════════════════
// Binary
// ══════════════════════════════════════════════════════════════════════════════

/// Apply a binary operator. `left` was pushed first (popped second).
pub fn binary(
    op: &Opcode,
    left: TypedValue,
    right: TypedValue,
    strings: &mut dyn StringTable,
) -> TypedValue {
    match op {
        Opcode::Add
        | Opcode::Subtract
        | Opcode::Multiply
        | Opcode::Divide
        | Opcode::Modulo
        | Opcode::BitwiseAnd
        | Opcode::BitwiseOr
        | Opcode::ShiftLeft
        | Opcode::ShiftRight => arithmetic(op, &left, &right),
        Opcode::And | Opcode::Or => match (left, right) {
            (TypedValue::Bool(l), TypedValue::Bool(r)) => {
                TypedValue::Bool(if matches!(op, Opcode::And) { l && r } else { l || r })
            }
            _ => TypedValue::Undefined,
        },
        Opcode::Equal
        | Opcode::NotEqual
        | Opcode::GreaterThan
        | Opcode::GreaterEqual
        | Opcode::LessThan
        | Opcode::LessEqual => match compare(strings, &left, &right) {
            Some(ord) => TypedValue::Bool(match op {
                Opcode::Equal => ord == Ordering::Equal,
                Opcode::NotEqual => ord != Ordering::Equal,
                Opcode::GreaterThan => ord == Ordering::Greater,
                Opcode::GreaterEqual => ord != Ordering::Less,
                Opcode::LessThan => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            }),
            None => TypedValue::Undefined,
        },
        Opcode::Catenate => catenate(left, right, strings),
        Opcode::Match | Opcode::Match2 => {
            let (Some(pattern), Some(subject)) = (text(strings, &left), text(strings, &right))
            else {
                return TypedValue::Undefined;
            };
            if matches!(op, Opcode::Match) {
                TypedValue::Bool(meta_match(&subject, &pattern))
            } else {
                RegexBuilder::new(&pattern)
                    .build()
                    .map_or(TypedValue::Undefined, |re| TypedValue::Bool(re.is_match(&subject)))
            }
        }
        _ => TypedValue::Undefined,
    }
}

/// Integer operators. Results are `U64`; multiply, divide and modulo use
/// the low 32 bits of the right operand.
fn arithmetic(op: &Opcode, left: &TypedValue, right: &TypedValue) -> TypedValue {
    let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) else {
        return TypedValue::Undefined;
    };
    let r32 = u64::from(r as u32);
    let value = match op {
        Opcode::Add => l.wrapping_add(r),
        Opcode::Subtract => l.wrapping_sub(r),
        Opcode::Multiply => l.wrapping_mul(r32),
        Opcode::Divide | Opcode::Modulo if r32 == 0 => return TypedValue::Undefined,
        Opcode::Divide => l / r32,
        Opcode::Modulo => l % r32,
        Opcode::BitwiseAnd => l & r,
        Opcode::BitwiseOr => l | r,
        Opcode::ShiftLeft => u32::try_from(r)
            .ok()
            .and_then(|shift| l.checked_shl(shift))
            .unwrap_or(0),
        Opcode::ShiftRight => u32::try_from(r)
            .ok()
            .and_then(|shift| l.checked_shr(shift))
            .unwrap_or(0),
        _ => return TypedValue::Undefined,
    };
    TypedValue::U64(value)
}

/// The value popped first comes first in the result.
fn catenate(left: TypedValue, right: TypedValue, strings: &mut dyn StringTable) -> TypedValue {
    match (left, right) {
        (l @ TypedValue::String(_), r @ TypedValue::String(_)) => {
            match (text(strings, &l), text(strings, &r)) {
                (Some(l), Some(r)) => new_string(strings, &(r + &l)),
                _ => TypedValue::Undefined,
            }
        }
        (TypedValue::Buffer(l), TypedValue::Buffer(mut r)) => {
            r.extend_from_slice(&l);
            TypedValue::Buffer(r)
        }
        _ => TypedValue::Undefined,
    }
}

/// Case-insensitive wildcard match: `*` any run, `?` any one character,
/// `[a-z]` a character class.
pub fn meta_match(subject: &str, pattern: &str) -> bool {
    let subject: Vec<char> = subject.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    match_from(&subject, &pattern)
}

fn match_from(subject: &[char], pattern: &[char]) -> bool {
    let Some((&head, rest)) = pattern.split_first() else {
        return subject.is_empty();
    };
    match head {
        '*' => (0..=subject.len()).any(|skip| match_from(&subject[skip..], rest)),
        '?' => !subject.is_empty() && match_from(&subject[1..], rest),
        '[' => {
            let Some(close) = rest.iter().position(|c| *c == ']') else {
                return subject.first() == Some(&'[') && match_from(&subject[1..], rest);
            };
            let Some(&c) = subject.first() else {
                return false;
            };
            class_contains(&rest[..close], c) && match_from(&subject[1..], &rest[close + 1..])
        }
        literal => subject.first() == Some(&literal) && match_from(&subject[1..], rest),
    }
}

fn class_contains(class: &[char], c: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if class[i] <= c && c <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}

// ══════════════════════════════════════════════════════════════════════════════
// Ternary
// ══════════════════════════════════════════════════════════════════════════════

/// Apply a three-operand opcode. Operands are in push order.
pub fn ternary(
    op: &Opcode,
    first: TypedValue,
    second: TypedValue,
    third: TypedValue,
    strings: &mut dyn StringTable,
) -> TypedValue {
    match op {
        Opcode::Conditional => match first {
            TypedValue::Bool(true) => second,
            TypedValue::Bool(false) => third,
            _ => TypedValue::Undefined,
        },
        Opcode::Find { case_sensitive } => {
            let (Some(haystack), Some(needle), Some(start)) =
                (text(strings, &first), text(strings, &second), third.as_u64())
            else {
                return TypedValue::Undefined;
            };
            find(&haystack, &needle, start, *case_sensitive)
        }
        Opcode::Mid => {
            let (Some(start), Some(len)) = (second.as_u64(), third.as_u64()) else {
                return TypedValue::Undefined;
            };
            let (start, len) = (clamp(start), clamp(len));
            match first {
                TypedValue::String(_) => match text(strings, &first) {
                    Some(s) => {
                        let mid: Vec<u16> = s.encode_utf16().skip(start).take(len).collect();
                        new_string(strings, &String::from_utf16_lossy(&mid))
                    }
                    None => TypedValue::Undefined,
                },
                TypedValue::Buffer(bytes) => {
                    TypedValue::Buffer(bytes.into_iter().skip(start).take(len).collect())
                }
                _ => TypedValue::Undefined,
            }
        }
        Opcode::Token => {
            let (Some(s), Some(delimiters), Some(index)) =
                (text(strings, &first), text(strings, &second), third.as_u64())
            else {
                return TypedValue::Undefined;
            };
            let token = s
                .split(|c: char| delimiters.contains(c))
                .nth(clamp(index))
                .unwrap_or("")
                .to_string();
            new_string(strings, &token)
        }
        Opcode::Span { mode } => {
            let (Some(s), Some(charset), Some(start)) =
                (text(strings, &first), text(strings, &second), third.as_u64())
            else {
                return TypedValue::Undefined;
            };
            span(&s, &charset, start, *mode)
        }
        _ => TypedValue::Undefined,
    }
}

fn clamp(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// UTF-16 index of `needle` in `haystack` at or after `start`;
/// `u64::MAX` when absent.
fn find(haystack: &str, needle: &str, start: u64, case_sensitive: bool) -> TypedValue {
    let (haystack, needle): (Vec<u16>, Vec<u16>) = if case_sensitive {
        (haystack.encode_utf16().collect(), needle.encode_utf16().collect())
    } else {
        (
            haystack.to_lowercase().encode_utf16().collect(),
            needle.to_lowercase().encode_utf16().collect(),
        )
    };
    let start = clamp(start);
    if start >= haystack.len() {
        return TypedValue::U64(u64::MAX);
    }
    let found = if needle.is_empty() {
        Some(0)
    } else {
        haystack[start..]
            .windows(needle.len())
            .position(|window| window == needle.as_slice())
    };
    found.map_or(TypedValue::U64(u64::MAX), |offset| {
        TypedValue::U64((start + offset) as u64)
    })
}

/// UTF-16 index of the first unit at or after `start` that is inside
/// (`FirstMatching`) or outside (`FirstNonMatching`) the set. The set is a
/// list of inclusive `lo hi` unit pairs.
fn span(s: &str, charset: &str, start: u64, mode: SpanMode) -> TypedValue {
    let ranges: Vec<u16> = charset.encode_utf16().collect();
    if ranges.len() % 2 != 0 {
        return TypedValue::Undefined;
    }
    let chars: Vec<u16> = s.encode_utf16().collect();
    let start = clamp(start);
    if start > chars.len() {
        return TypedValue::Undefined;
    }
    let in_set = |c: u16| ranges.chunks_exact(2).any(|pair| pair[0] <= c && c <= pair[1]);
    let want = matches!(mode, SpanMode::FirstMatching);
    chars[start..]
        .iter()
        .position(|c| in_set(*c) == want)
        .map_or(TypedValue::U64(u64::MAX), |i| TypedValue::U64((start + i) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::PackageStrings;

    fn s(strings: &mut PackageStrings, text: &str) -> TypedValue {
        TypedValue::String(strings.intern(text))
    }

    fn resolve(strings: &PackageStrings, value: &TypedValue) -> String {
        text(strings, value).unwrap()
    }

    #[test]
    fn test_arithmetic_rejects_non_integers() {
        let mut strings = PackageStrings::new();
        let name = s(&mut strings, "x");
        for op in [Opcode::Add, Opcode::Subtract, Opcode::Multiply, Opcode::ShiftLeft] {
            assert_eq!(
                binary(&op, name.clone(), TypedValue::U8(1), &mut strings),
                TypedValue::Undefined
            );
            assert_eq!(
                binary(&op, TypedValue::U8(1), TypedValue::Buffer(vec![1]), &mut strings),
                TypedValue::Undefined
            );
        }
    }

    #[test]
    fn test_arithmetic_widens_to_u64() {
        let mut strings = PackageStrings::new();
        assert_eq!(
            binary(&Opcode::Add, TypedValue::U8(250), TypedValue::U8(10), &mut strings),
            TypedValue::U64(260)
        );
        assert_eq!(
            binary(&Opcode::Subtract, TypedValue::U8(1), TypedValue::U8(2), &mut strings),
            TypedValue::U64(u64::MAX)
        );
        assert_eq!(
            binary(&Opcode::Divide, TypedValue::U32(9), TypedValue::U8(0), &mut strings),
            TypedValue::Undefined
        );
        assert_eq!(
            binary(&Opcode::Modulo, TypedValue::U32(9), TypedValue::U8(4), &mut strings),
            TypedValue::U64(1)
        );
        assert_eq!(
            binary(&Opcode::ShiftLeft, TypedValue::U8(1), TypedValue::U8(70), &mut strings),
            TypedValue::U64(0)
        );
    }

    #[test]
    fn test_compare_kinds() {
        let mut strings = PackageStrings::new();
        let a = s(&mut strings, "abc");
        let b = s(&mut strings, "abd");
        assert_eq!(compare(&strings, &a, &b), Some(Ordering::Less));
        assert_eq!(compare(&strings, &a, &TypedValue::U8(1)), None);
        assert_eq!(
            compare(&strings, &TypedValue::Buffer(vec![1]), &TypedValue::Buffer(vec![1, 0])),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&strings, &TypedValue::Bool(true), &TypedValue::U64(1)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_orders_by_wrapping_difference() {
        let strings = PackageStrings::new();
        let zero = TypedValue::U64(0);
        let ones = TypedValue::U64(u64::MAX);
        assert_eq!(compare(&strings, &zero, &ones), Some(Ordering::Greater));
        assert_eq!(compare(&strings, &ones, &zero), Some(Ordering::Less));

        let low = TypedValue::U64(1);
        let high = TypedValue::U64((1 << 63) + 1);
        assert_eq!(compare(&strings, &low, &high), Some(Ordering::Less));
        assert_eq!(compare(&strings, &high, &low), Some(Ordering::Greater));
        assert_eq!(
            compare(&strings, &TypedValue::U8(3), &TypedValue::U32(9)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let mut strings = PackageStrings::new();
        let values = vec![
            TypedValue::U8(0),
            TypedValue::U64(u64::MAX),
            TypedValue::U32(7),
            TypedValue::Bool(true),
            TypedValue::Buffer(vec![]),
            TypedValue::Buffer(vec![0, 1]),
            s(&mut strings, "A"),
            s(&mut strings, "a"),
        ];
        for a in &values {
            assert_eq!(compare(&strings, a, a), Some(Ordering::Equal));
            for b in &values {
                let ab = compare(&strings, a, b);
                let ba = compare(&strings, b, a);
                assert_eq!(ab, ba.map(Ordering::reverse));
            }
        }
    }

    #[test]
    fn test_catenate_puts_top_first() {
        let mut strings = PackageStrings::new();
        let ab = s(&mut strings, "AB");
        let cd = s(&mut strings, "CD");
        let joined = binary(&Opcode::Catenate, ab, cd, &mut strings);
        assert_eq!(resolve(&strings, &joined), "CDAB");

        let joined = binary(
            &Opcode::Catenate,
            TypedValue::Buffer(vec![1]),
            TypedValue::Buffer(vec![2]),
            &mut strings,
        );
        assert_eq!(joined, TypedValue::Buffer(vec![2, 1]));
    }

    #[test]
    fn test_meta_match() {
        assert!(meta_match("Boot0001", "boot*"));
        assert!(meta_match("abc", "a?c"));
        assert!(meta_match("b7", "[a-c][0-9]"));
        assert!(!meta_match("d7", "[a-c][0-9]"));
        assert!(!meta_match("abc", "ab"));
    }

    #[test]
    fn test_match2_regex() {
        let mut strings = PackageStrings::new();
        let pattern = s(&mut strings, "^[0-9]+$");
        let subject = s(&mut strings, "1234");
        assert_eq!(
            binary(&Opcode::Match2, pattern, subject, &mut strings),
            TypedValue::Bool(true)
        );
        let bad = s(&mut strings, "(");
        let subject = s(&mut strings, "x");
        assert_eq!(binary(&Opcode::Match2, bad, subject, &mut strings), TypedValue::Undefined);
    }

    #[test]
    fn test_to_string_formats() {
        let mut strings = PackageStrings::new();
        let op = Opcode::ToString {
            format: StringFormat::UpperHex,
            buffer_encoding: BufferEncoding::Ascii,
        };
        let v = unary(&op, TypedValue::U16(0xbeef), &mut strings);
        assert_eq!(resolve(&strings, &v), "BEEF");

        let op = Opcode::ToString {
            format: StringFormat::SignedDecimal,
            buffer_encoding: BufferEncoding::Ascii,
        };
        let v = unary(&op, TypedValue::U64(u64::MAX), &mut strings);
        assert_eq!(resolve(&strings, &v), "-1");

        let op = Opcode::ToString {
            format: StringFormat::UnsignedDecimal,
            buffer_encoding: BufferEncoding::Ucs2,
        };
        let v = unary(&op, TypedValue::Buffer(vec![b'O', 0, b'K', 0, 0, 0]), &mut strings);
        assert_eq!(resolve(&strings, &v), "OK");
        let v = unary(&op, TypedValue::Bool(true), &mut strings);
        assert_eq!(resolve(&strings, &v), "True");
    }

    #[test]
    fn test_to_uint_and_to_boolean() {
        let mut strings = PackageStrings::new();
        let hex = s(&mut strings, "0x1F");
        assert_eq!(unary(&Opcode::ToUint, hex, &mut strings), TypedValue::U64(31));
        let junk = s(&mut strings, "nope");
        assert_eq!(unary(&Opcode::ToUint, junk.clone(), &mut strings), TypedValue::Undefined);
        assert_eq!(
            unary(&Opcode::ToUint, TypedValue::Buffer(vec![1, 1]), &mut strings),
            TypedValue::U64(0x101)
        );
        let yes = s(&mut strings, "True");
        assert_eq!(unary(&Opcode::ToBoolean, yes, &mut strings), TypedValue::Bool(true));
        assert_eq!(unary(&Opcode::ToBoolean, junk, &mut strings), TypedValue::Undefined);
        assert_eq!(
            unary(&Opcode::ToBoolean, TypedValue::U8(0), &mut strings),
            TypedValue::Bool(false)
        );
    }

    #[test]
    fn test_string_ternaries() {
        let mut strings = PackageStrings::new();
        let text_value = s(&mut strings, "alpha,beta,gamma");
        let comma = s(&mut strings, ",");
        let token = ternary(&Opcode::Token, text_value.clone(), comma, TypedValue::U8(1), &mut strings);
        assert_eq!(resolve(&strings, &token), "beta");

        let needle = s(&mut strings, "BETA");
        let insensitive = Opcode::Find {
            case_sensitive: false,
        };
        assert_eq!(
            ternary(&insensitive, text_value.clone(), needle.clone(), TypedValue::U8(0), &mut strings),
            TypedValue::U64(6)
        );
        let sensitive = Opcode::Find {
            case_sensitive: true,
        };
        assert_eq!(
            ternary(&sensitive, text_value.clone(), needle, TypedValue::U8(0), &mut strings),
            TypedValue::U64(u64::MAX)
        );

        let mid = ternary(&Opcode::Mid, text_value.clone(), TypedValue::U8(6), TypedValue::U8(4), &mut strings);
        assert_eq!(resolve(&strings, &mid), "beta");

        let digits = s(&mut strings, "09");
        let span_op = Opcode::Span {
            mode: SpanMode::FirstNonMatching,
        };
        let subject = s(&mut strings, "123abc");
        assert_eq!(
            ternary(&span_op, subject.clone(), digits.clone(), TypedValue::U8(0), &mut strings),
            TypedValue::U64(3)
        );
        assert_eq!(
            ternary(&span_op, subject, digits, TypedValue::U8(9), &mut strings),
            TypedValue::Undefined
        );
    }

    #[test]
    fn test_string_positions_count_utf16_units() {
        let mut strings = PackageStrings::new();
        let clef = s(&mut strings, "a\u{1D11E}b");
        assert_eq!(
            unary(&Opcode::Length, clef.clone(), &mut strings),
            TypedValue::U64(4)
        );

        let b = s(&mut strings, "b");
        let find = Opcode::Find {
            case_sensitive: true,
        };
        assert_eq!(
            ternary(&find, clef.clone(), b, TypedValue::U8(0), &mut strings),
            TypedValue::U64(3)
        );

        let mid = ternary(&Opcode::Mid, clef, TypedValue::U8(1), TypedValue::U8(2), &mut strings);
        assert_eq!(resolve(&strings, &mid), "\u{1D11E}");
    }

    #[test]
    fn test_conditional_requires_bool() {
        let mut strings = PackageStrings::new();
        assert_eq!(
            ternary(
                &Opcode::Conditional,
                TypedValue::Bool(false),
                TypedValue::U8(1),
                TypedValue::U8(2),
                &mut strings
            ),
            TypedValue::U8(2)
        );
        assert_eq!(
            ternary(
                &Opcode::Conditional,
                TypedValue::U8(1),
                TypedValue::U8(1),
                TypedValue::U8(2),
                &mut strings
            ),
            TypedValue::Undefined
        );
    }
}
