//! S-expression reader: character cursor → object tree.

use scmc_heap::{CellIdx, Heap};
use tracing::trace;

use crate::cursor::Cursor;
use crate::error::{ReadError, Result};

/// Symbols/strings longer than this many bytes fail with `TokenTooLong`.
pub const MAX_TOKEN_LEN: usize = 4096;

/// Reads exactly one S-expression from `cursor`, advancing it past the
/// expression. On an empty/whitespace-only input, returns `heap.nil()`.
/// Fails if the first significant token is a stray `)`/`]`.
pub fn read(heap: &mut Heap, cursor: &mut Cursor) -> Result<CellIdx> {
    let obj = read_expr(heap, cursor)?;
    if let Some(c) = stray_closer(heap, obj) {
        let (line, column) = (cursor.line(), cursor.column());
        return Err(if c == ')' {
            ReadError::StrayCloseParen { line, column }
        } else {
            ReadError::StrayCloseBracket { line, column }
        });
    }
    Ok(obj)
}

/// A closer read outside of any list context comes back as the symbol `)`
/// or `]` — source text can never otherwise produce a symbol spelled that
/// way, since both characters are always treated as delimiters, so this
/// doubles as an unambiguous sentinel without a separate cell type.
fn stray_closer(heap: &Heap, obj: CellIdx) -> Option<char> {
    if heap.obj_type(obj) != scmc_heap::ObjType::Symbol {
        return None;
    }
    match heap.symbols().lookup(heap.string_id_of(obj)) {
        Some(")") => Some(')'),
        Some("]") => Some(']'),
        _ => None,
    }
}

fn read_expr(heap: &mut Heap, cursor: &mut Cursor) -> Result<CellIdx> {
    cursor.skip_whitespace_and_comments();
    if cursor.is_eof() {
        return Ok(heap.nil());
    }

    match cursor.current() {
        b'(' => {
            cursor.advance();
            read_list(heap, cursor, ')')
        }
        b'[' => {
            cursor.advance();
            read_list(heap, cursor, ']')
        }
        b')' => {
            cursor.advance();
            Ok(heap.alloc_symbol(")")?)
        }
        b']' => {
            cursor.advance();
            Ok(heap.alloc_symbol("]")?)
        }
        b'\'' => {
            cursor.advance();
            wrap(heap, cursor, "quote")
        }
        b'`' => {
            cursor.advance();
            wrap(heap, cursor, "quasiquote")
        }
        b',' => {
            cursor.advance();
            if cursor.current() == b'@' {
                cursor.advance();
                wrap(heap, cursor, "unquote-splicing")
            } else {
                wrap(heap, cursor, "unquote")
            }
        }
        b'"' => read_string(heap, cursor),
        _ => read_atom(heap, cursor),
    }
}

fn wrap(heap: &mut Heap, cursor: &mut Cursor, head: &str) -> Result<CellIdx> {
    let mark = heap.save_roots();
    let inner = read_expr(heap, cursor)?;
    if let Some(c) = stray_closer(heap, inner) {
        let (line, column) = (cursor.line(), cursor.column());
        return Err(if c == ')' {
            ReadError::StrayCloseParen { line, column }
        } else {
            ReadError::StrayCloseBracket { line, column }
        });
    }
    heap.restore_roots(mark);
    heap.push_root(inner);
    let sym = heap.alloc_symbol(head)?;
    let tail = heap.alloc_cons(inner, heap.nil())?;
    let list = heap.alloc_cons(sym, tail)?;
    heap.restore_roots(mark);
    heap.push_root(list);
    Ok(list)
}

fn read_list(heap: &mut Heap, cursor: &mut Cursor, closer: char) -> Result<CellIdx> {
    let start_line = cursor.line();
    let start_col = cursor.column();
    let mark = heap.save_roots();
    let mut elems: Vec<CellIdx> = Vec::new();
    let mut dotted_tail: Option<CellIdx> = None;

    loop {
        cursor.skip_whitespace_and_comments();
        if cursor.is_eof() {
            return Err(ReadError::UnclosedList {
                line: start_line,
                column: start_col,
            });
        }
        let c = cursor.current() as char;
        if c == ')' || c == ']' {
            if c != closer {
                return Err(ReadError::MismatchedDelimiter {
                    expected: closer,
                    found: c,
                    line: cursor.line(),
                });
            }
            cursor.advance();
            break;
        }
        if c == '.' && is_delimiter(cursor.byte_at(1)) {
            cursor.advance();
            let tail = read_expr(heap, cursor)?;
            heap.restore_roots(mark);
            for &e in &elems {
                heap.push_root(e);
            }
            heap.push_root(tail);
            dotted_tail = Some(tail);
            cursor.skip_whitespace_and_comments();
            let close = cursor.current() as char;
            if close != closer {
                return Err(ReadError::MismatchedDelimiter {
                    expected: closer,
                    found: close,
                    line: cursor.line(),
                });
            }
            cursor.advance();
            break;
        }
        let elem = read_expr(heap, cursor)?;
        elems.push(elem);
        heap.restore_roots(mark);
        for &e in &elems {
            heap.push_root(e);
        }
    }

    let mut result = dotted_tail.unwrap_or_else(|| heap.nil());
    for &e in elems.iter().rev() {
        result = heap.alloc_cons(e, result)?;
    }
    heap.restore_roots(mark);
    heap.push_root(result);
    trace!(elements = elems.len(), "read list");
    Ok(result)
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, 0 | b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'[' | b']' | b'"' | b';')
}

fn read_string(heap: &mut Heap, cursor: &mut Cursor) -> Result<CellIdx> {
    let start_line = cursor.line();
    let start_col = cursor.column();
    cursor.advance(); // opening quote
    let mut buf = String::new();
    loop {
        if cursor.is_eof() {
            return Err(ReadError::UnclosedString {
                line: start_line,
                column: start_col,
            });
        }
        let b = cursor.advance();
        match b {
            b'"' => break,
            b'\\' => {
                let esc = cursor.advance();
                buf.push(match esc {
                    b'n' => '\n',
                    b'r' => '\r',
                    b't' => '\t',
                    b'"' => '"',
                    b'\\' => '\\',
                    other => other as char,
                });
            }
            other => buf.push(other as char),
        }
        if buf.len() > MAX_TOKEN_LEN {
            return Err(ReadError::TokenTooLong {
                max: MAX_TOKEN_LEN,
                line: start_line,
                column: start_col,
            });
        }
    }
    Ok(heap.alloc_string(&buf)?)
}

fn read_atom(heap: &mut Heap, cursor: &mut Cursor) -> Result<CellIdx> {
    let start_line = cursor.line();
    let start_col = cursor.column();
    let mut buf = String::new();
    while !cursor.is_eof() && !is_delimiter(cursor.current()) {
        buf.push(cursor.advance() as char);
        if buf.len() > MAX_TOKEN_LEN {
            return Err(ReadError::TokenTooLong {
                max: MAX_TOKEN_LEN,
                line: start_line,
                column: start_col,
            });
        }
    }

    if let Some(name) = buf.strip_prefix("#:") {
        return Ok(heap.alloc_keyword(name)?);
    }

    if looks_like_number(&buf) {
        let is_flonum = buf.bytes().skip(1).any(|b| matches!(b, b'.' | b'e' | b'E' | b'-'));
        return if is_flonum {
            match buf.parse::<f32>() {
                Ok(v) => Ok(heap.alloc_flonum(v)?),
                Err(_) => Err(ReadError::InvalidNumber { text: buf, line: start_line }),
            }
        } else {
            match buf.parse::<i32>() {
                Ok(v) => Ok(heap.alloc_fixnum(v)?),
                Err(_) => Err(ReadError::InvalidNumber { text: buf, line: start_line }),
            }
        };
    }

    Ok(heap.alloc_symbol(&buf)?)
}

fn looks_like_number(buf: &str) -> bool {
    let bytes = buf.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'+') | Some(b'-') => bytes.get(1).map(|b| b.is_ascii_digit()).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmc_heap::to_string;

    fn read_one(heap: &mut Heap, src: &str) -> CellIdx {
        let mut cursor = Cursor::new(src);
        read(heap, &mut cursor).unwrap()
    }

    #[test]
    fn empty_input_is_nil() {
        let mut heap = Heap::new(8192);
        let obj = read_one(&mut heap, "   ; just a comment\n");
        assert!(heap.is_nil(obj));
    }

    #[test]
    fn reads_fixnum_and_flonum() {
        let mut heap = Heap::new(8192);
        let fx = read_one(&mut heap, "42");
        assert_eq!(heap.get(fx).fixnum_value(), 42);
        let fl = read_one(&mut heap, "3.5");
        assert_eq!(heap.get(fl).flonum_value(), 3.5);
        let neg = read_one(&mut heap, "-7");
        assert_eq!(heap.get(neg).fixnum_value(), -7);
    }

    #[test]
    fn reads_nested_list() {
        let mut heap = Heap::new(8192);
        let obj = read_one(&mut heap, "(+ 1 (* 2 3))");
        assert_eq!(to_string(&heap, obj, false), "(+ 1 (* 2 3))");
    }

    #[test]
    fn reads_dotted_pair() {
        let mut heap = Heap::new(8192);
        let obj = read_one(&mut heap, "(1 . 2)");
        assert_eq!(to_string(&heap, obj, false), "(1 . 2)");
    }

    #[test]
    fn quote_forms_desugar() {
        let mut heap = Heap::new(8192);
        assert_eq!(to_string(&heap, read_one(&mut heap, "'x"), false), "(quote x)");
        assert_eq!(to_string(&heap, read_one(&mut heap, "`x"), false), "(quasiquote x)");
        assert_eq!(to_string(&heap, read_one(&mut heap, ",x"), false), "(unquote x)");
        assert_eq!(
            to_string(&heap, read_one(&mut heap, ",@x"), false),
            "(unquote-splicing x)"
        );
    }

    #[test]
    fn reads_keyword_and_string() {
        let mut heap = Heap::new(8192);
        let kw = read_one(&mut heap, "#:foo");
        assert_eq!(to_string(&heap, kw, false), "#:foo");
        let s = read_one(&mut heap, "\"hi\\nthere\"");
        assert_eq!(to_string(&heap, s, false), "hi\nthere");
    }

    #[test]
    fn stray_close_paren_is_an_error() {
        let mut heap = Heap::new(8192);
        let mut cursor = Cursor::new(")");
        assert!(matches!(read(&mut heap, &mut cursor), Err(ReadError::StrayCloseParen { .. })));
    }

    #[test]
    fn quote_prefix_followed_by_stray_closer_is_an_error() {
        let mut heap = Heap::new(8192);
        let mut cursor = Cursor::new("')");
        assert!(matches!(read(&mut heap, &mut cursor), Err(ReadError::StrayCloseParen { .. })));
    }

    #[test]
    fn mismatched_delimiter_is_an_error() {
        let mut heap = Heap::new(8192);
        let mut cursor = Cursor::new("(1 2]");
        assert!(matches!(
            read(&mut heap, &mut cursor),
            Err(ReadError::MismatchedDelimiter { .. })
        ));
    }

    #[test]
    fn unclosed_list_is_an_error() {
        let mut heap = Heap::new(8192);
        let mut cursor = Cursor::new("(1 2");
        assert!(matches!(read(&mut heap, &mut cursor), Err(ReadError::UnclosedList { .. })));
    }
}
