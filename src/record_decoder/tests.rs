use super::*;
use crate::types::LineTerminator;
use std::io::Cursor;

fn input(data: &str) -> CountedInput {
    CountedInput::from_reader(Cursor::new(data.as_bytes().to_vec()))
}

fn delimited(data: &str, options: DelimitedOptions) -> DelimitedDecoder {
    DelimitedDecoder::new(input(data), options)
}

fn drain(decoder: &mut dyn RecordDecoder) -> Vec<Decoded> {
    let mut out = Vec::new();
    while let Some(decoded) = decoder.next_record().unwrap() {
        out.push(decoded);
    }
    out
}

fn fields(values: &[&str]) -> Record {
    Record::Fields(values.iter().map(|v| Some(v.to_string())).collect())
}

#[cfg(test)]
mod delimited_tests {
    use super::*;

    #[test]
    fn test_header_then_records() {
        let mut decoder = delimited("a,b\n1,2\n3,4\n", DelimitedOptions::default());
        let header = decoder.read_header_fields().unwrap().unwrap();
        assert_eq!(header, vec!["a", "b"]);
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["1", "2"]));
        assert_eq!(records[1].line, 3);
        assert_eq!(decoder.lines_read(), 3);
    }

    #[test]
    fn test_field_count_is_enforced() {
        let mut decoder = delimited("1,2\n3,x,y\n4\n", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert!(records[0].outcome.is_ok());
        assert!(matches!(
            records[1].outcome,
            Err(DecodeError::FieldCount { expected: 2, found: 3 })
        ));
        assert!(matches!(
            records[2].outcome,
            Err(DecodeError::FieldCount { expected: 2, found: 1 })
        ));
        assert_eq!(records[1].raw, b"3,x,y");
    }

    #[test]
    fn test_lenient_quotes() {
        let mut decoder = delimited("a\"b,c\n\"x\"\"y\",z\n", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["a\"b", "c"]));
        assert_eq!(records[1].outcome.as_ref().unwrap(), &fields(&["x\"y", "z"]));
    }

    #[test]
    fn test_quoted_field_spans_lines() {
        let mut decoder = delimited("1,\"multi\nline\"\n2,plain\n", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["1", "multi\nline"]));
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_carriage_return_terminator() {
        let options = DelimitedOptions {
            line_terminator: LineTerminator::CarriageReturn,
            ..DelimitedOptions::default()
        };
        let mut decoder = delimited("a;b\r1;2\r3;4\r", DelimitedOptions { delimiter: b';', ..options });
        assert_eq!(decoder.read_header_fields().unwrap().unwrap(), vec!["a", "b"]);
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 3);
        assert_eq!(records[1].outcome.as_ref().unwrap(), &fields(&["3", "4"]));
    }

    #[test]
    fn test_nul_bytes_are_stripped() {
        let mut decoder = delimited("ab\0c,d\0\n", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["abc", "d"]));
    }

    #[test]
    fn test_null_sentinel() {
        let options = DelimitedOptions {
            null_value: Some("NULL".to_string()),
            ..DelimitedOptions::default()
        };
        let mut decoder = delimited("1,NULL\n", options);
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(
            records[0].outcome.as_ref().unwrap(),
            &Record::Fields(vec![Some("1".to_string()), None])
        );
    }

    #[test]
    fn test_blank_lines_are_counted_but_skipped() {
        let mut decoder = delimited("1,2\n\n\r\n3,4", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 4);
        assert_eq!(records[1].raw, b"3,4");
    }

    #[test]
    fn test_crlf_input() {
        let mut decoder = delimited("a,b\r\n1,2\r\n", DelimitedOptions::default());
        assert_eq!(decoder.read_header_fields().unwrap().unwrap(), vec!["a", "b"]);
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records[0].raw, b"1,2");
        assert_eq!(records[0].terminator, b"\r\n");
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["1", "2"]));
    }

    #[test]
    fn test_stray_carriage_return_before_quote() {
        let mut decoder = delimited("1,x\r\"y\n2,3\n4,5\n", DelimitedOptions::default());
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["1", "x\r\"y"]));
        assert_eq!(records[1].line, 2);
        assert_eq!(records[2].outcome.as_ref().unwrap(), &fields(&["4", "5"]));
    }

    #[test]
    fn test_stray_newline_before_quote_with_carriage_return_terminator() {
        let options = DelimitedOptions {
            line_terminator: LineTerminator::CarriageReturn,
            ..DelimitedOptions::default()
        };
        let mut decoder = delimited("1,x\n\"y\r2,3\r4,5\r", options);
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].outcome.as_ref().unwrap(), &fields(&["1", "x\n\"y"]));
        assert_eq!(records[0].terminator, b"\r");
        assert_eq!(records[2].line, 3);
        assert_eq!(records[2].outcome.as_ref().unwrap(), &fields(&["4", "5"]));
    }

    #[test]
    fn test_final_record_without_terminator() {
        let mut decoder = delimited("1,2\n3,4", DelimitedOptions::default());
        let records = drain(&mut decoder);
        assert_eq!(records[0].terminator, b"\n");
        assert_eq!(records[1].raw, b"3,4");
        assert_eq!(records[1].terminator, b"\n");
    }

    #[test]
    fn test_bom_is_removed_from_header() {
        let mut decoder = delimited("\u{feff}id,name\n", DelimitedOptions::default());
        assert_eq!(decoder.read_header_fields().unwrap().unwrap(), vec!["id", "name"]);
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let data = b"ok,\xff\xfe\n".to_vec();
        let mut decoder = DelimitedDecoder::new(
            CountedInput::from_reader(Cursor::new(data)),
            DelimitedOptions::default(),
        );
        decoder.set_expected_fields(2);

        let records = drain(&mut decoder);
        assert!(matches!(records[0].outcome, Err(DecodeError::InvalidUtf8)));
    }

    #[test]
    fn test_skip_line_counts_one_line() {
        let mut decoder = delimited("header,row\n1,2\n", DelimitedOptions::default());
        assert!(decoder.skip_line().unwrap());
        assert_eq!(decoder.lines_read(), 1);
        decoder.set_expected_fields(2);
        let records = drain(&mut decoder);
        assert_eq!(records[0].line, 2);
    }

    #[test]
    fn test_empty_input() {
        let mut decoder = delimited("", DelimitedOptions::default());
        assert!(decoder.read_header_fields().unwrap().is_none());
        assert!(decoder.next_record().unwrap().is_none());
    }

    #[test]
    fn test_bytes_read_tracks_input() {
        let data = "a,b\n1,2\n";
        let mut decoder = delimited(data, DelimitedOptions::default());
        drain(&mut decoder);
        assert_eq!(decoder.bytes_read(), data.len() as u64);
    }
}

#[cfg(test)]
mod json_tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let mut decoder = JsonLinesDecoder::new(input("{\"a\":1}\n[1,2]\r\n\n{oops}\n\"tail\""));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0].outcome.as_ref().unwrap(),
            &Record::Document("{\"a\":1}".to_string())
        );
        assert_eq!(records[1].raw, b"[1,2]");
        assert_eq!(records[1].terminator, b"\r\n");
        assert_eq!(records[2].line, 4);
        assert!(matches!(records[2].outcome, Err(DecodeError::InvalidJson(_))));
        assert_eq!(records[3].line, 5);
        assert!(records[3].outcome.is_ok());
    }

    #[test]
    fn test_json_lines_long_line() {
        let big = format!("{{\"blob\":\"{}\"}}\n", "x".repeat(1 << 20));
        let mut decoder = JsonLinesDecoder::new(input(&big));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 1);
        assert!(records[0].outcome.is_ok());
        assert_eq!(records[0].raw.len(), big.len() - 1);
    }

    #[test]
    fn test_json_document_is_single_row() {
        let mut decoder = JsonDocumentDecoder::new(input("{\n  \"a\": [1, 2]\n}\n"));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, 1);
        assert!(records[0].outcome.is_ok());
        assert_eq!(decoder.lines_read(), 3);
    }

    #[test]
    fn test_json_document_invalid() {
        let mut decoder = JsonDocumentDecoder::new(input("{\"a\": "));
        let records = drain(&mut decoder);
        assert!(matches!(records[0].outcome, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_json_document_empty_input() {
        let mut decoder = JsonDocumentDecoder::new(input("  \n"));
        assert!(decoder.next_record().unwrap().is_none());
    }
}
