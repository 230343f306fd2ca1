use std::fs;

use regex::Regex;
use serde_json::json;
use tempfile::tempdir;

use filekit::stream::format::LINE_ENDING;
use filekit::{
    CsvDialect, ReadFormat, Record, StreamError, StreamReader, StreamWriter, XmlElement,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn lines(reader: &mut StreamReader) -> Vec<String> {
    reader
        .by_ref()
        .map(|r| r.unwrap().as_line().unwrap().to_string())
        .collect()
}

// Line reader over "a\nb\nc" keeps terminators on every line but the last.
#[test]
fn line_reader_yields_each_line() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("abc.txt");
    fs::write(&p, "a\nb\nc")?;

    let mut r = StreamReader::new(&p);
    r.line()?;
    assert_eq!(r.key(), 0);
    assert_eq!(lines(&mut r), ["a\n", "b\n", "c"]);
    assert_eq!(StreamReader::count(&r), 3);
    Ok(())
}

#[test]
fn append_writer_adds_lines() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("hello.txt");

    let mut w = StreamWriter::new(&p, true);
    w.line("Hello")?;
    w.line("World")?;
    assert_eq!(w.count(), 2);
    assert_eq!(
        fs::read_to_string(&p)?,
        format!("Hello{LINE_ENDING}World{LINE_ENDING}")
    );
    Ok(())
}

#[test]
fn csv_writer_then_reader() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("people.csv");

    let mut w = StreamWriter::new(&p, false);
    w.csv(["Name", "Age"])?;
    w.csv_serialize(&("John", 30))?;
    assert_eq!(fs::read_to_string(&p)?, "Name,Age\nJohn,30\n");

    let mut r = StreamReader::new(&p);
    r.csv(CsvDialect::default())?;
    let rows: Vec<Vec<String>> = r
        .by_ref()
        .map(|rec| rec.unwrap().as_fields().unwrap().to_vec())
        .collect();
    assert_eq!(rows, vec![vec!["Name", "Age"], vec!["John", "30"]]);
    Ok(())
}

// Seeking to 2 then advancing once lands on the fourth chunk.
#[test]
fn binary_seek_then_advance() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("blob.bin");
    let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    fs::write(&p, &data)?;

    let mut r = StreamReader::new(&p);
    r.binary(1024)?;
    r.seek(2)?;
    assert_eq!(r.key(), 2);
    r.advance()?;
    assert_eq!(r.key(), 3);
    assert_eq!(r.current(), Some(&Record::Bytes(data[3072..4096].to_vec())));
    r.advance()?;
    assert!(!r.valid());
    Ok(())
}

#[test]
fn json_reader_fails_on_first_record() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("bad.jsonl");
    fs::write(&p, "not json\n{\"a\":1}")?;

    let mut r = StreamReader::new(&p);
    let err = r.json().unwrap_err();
    assert!(matches!(err, StreamError::Decode { record: 0, .. }), "{err}");
    assert!(!r.valid());
    Ok(())
}

#[test]
fn json_array_round_trip() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("array.json");

    let mut w = StreamWriter::new(&p, false);
    w.json_array(&[json!({"key": "value"})])?;
    w.close()?;

    let mut r = StreamReader::new(&p);
    r.json_array()?;
    let items: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(items, vec![Record::Json(json!({"key": "value"}))]);
    Ok(())
}

#[test]
fn rewind_replays_the_same_sequence() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("r.txt");
    fs::write(&p, "one\ntwo\nthree\n")?;

    let mut r = StreamReader::new(&p);
    r.line()?;
    let first = lines(&mut r);
    r.rewind()?;
    assert_eq!(r.key(), 0);
    let second = lines(&mut r);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn seek_matches_rewind_and_advance() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("s.txt");
    fs::write(&p, "l0\nl1\nl2\nl3\n")?;

    let mut stepped = StreamReader::new(&p);
    stepped.line()?;
    stepped.advance()?;
    stepped.advance()?;

    let mut sought = StreamReader::new(&p);
    sought.line()?;
    sought.advance()?;
    sought.seek(2)?;

    assert_eq!(sought.key(), stepped.key());
    assert_eq!(sought.current(), stepped.current());

    sought.seek(10)?;
    assert!(!sought.valid());
    assert_eq!(sought.key(), 4);
    Ok(())
}

#[test]
fn missing_path_fails_on_first_access_only() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("absent.txt");

    let mut r = StreamReader::new(&p);
    let err = r.line().unwrap_err();
    assert!(matches!(err, StreamError::Access { .. }), "{err}");

    let mut w = StreamWriter::new(tmp.path().join("no/such/dir/out.txt"), false);
    assert!(matches!(w.line("x"), Err(StreamError::Access { .. })));
    assert_eq!(w.count(), 0);
    Ok(())
}

#[test]
fn non_append_sessions_truncate() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("session.txt");

    let mut first = StreamWriter::new(&p, false);
    first.line("old one")?;
    first.line("old two")?;
    drop(first);

    let mut second = StreamWriter::new(&p, false);
    second.line("new")?;
    assert_eq!(fs::read_to_string(&p)?, format!("new{LINE_ENDING}"));

    second.close()?;
    second.line("again")?;
    assert_eq!(fs::read_to_string(&p)?, format!("again{LINE_ENDING}"));
    Ok(())
}

#[test]
fn xml_writer_then_reader() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("items.xml");
    fs::write(&p, "<items>\n")?;

    let mut w = StreamWriter::new(&p, true);
    for (id, name) in [("1", "bolt"), ("2", "nut & washer")] {
        w.xml(
            &XmlElement::new("item")
                .with_attribute("id", id)
                .with_child(XmlElement::new("name").with_text(name)),
        )?;
    }
    w.line("</items>")?;

    let mut r = StreamReader::new(&p);
    r.xml("item")?;
    let names: Vec<String> = r
        .by_ref()
        .map(|rec| {
            let rec = rec.unwrap();
            rec.as_xml().unwrap().child("name").unwrap().text.clone()
        })
        .collect();
    assert_eq!(names, ["bolt", "nut & washer"]);
    Ok(())
}

#[test]
fn serialized_values_come_back_typed() -> TestResult {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Point {
        x: i32,
        label: String,
    }

    let tmp = tempdir()?;
    let p = tmp.path().join("points.dat");
    let mut w = StreamWriter::new(&p, false);
    w.serialized(&Point { x: -3, label: "a".into() })?;
    w.serialized(&Point { x: 7, label: "b\nc".into() })?;

    let mut r = StreamReader::new(&p);
    r.serialized()?;
    let points: Vec<Point> = r.values::<Point>().collect::<Result<_, _>>()?;
    assert_eq!(
        points,
        vec![
            Point { x: -3, label: "a".into() },
            Point { x: 7, label: "b\nc".into() },
        ]
    );
    Ok(())
}

#[test]
fn fixed_width_and_regex_formats() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("cols.txt");
    let mut w = StreamWriter::new(&p, false);
    w.fixed_width(&["ab", "123"], &[4, 3])?;
    w.fixed_width(&["xyz", "9"], &[4, 3])?;

    let mut r = StreamReader::new(&p);
    r.fixed_width(vec![4, 3])?;
    let rows: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(
        rows,
        vec![
            Record::Fields(vec!["ab  ".into(), "123".into()]),
            Record::Fields(vec!["xyz ".into(), "9  ".into()]),
        ]
    );

    let mut r = StreamReader::new(&p);
    r.regex(Regex::new(r"^(\w+)\s+(\d+)")?)?;
    let caps: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(
        caps,
        vec![
            Record::Captures(vec!["ab  123".into(), "ab".into(), "123".into()]),
            Record::Captures(vec!["xyz 9".into(), "xyz".into(), "9".into()]),
        ]
    );
    Ok(())
}

#[test]
fn character_reader_walks_code_points() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("chars.txt");
    let mut w = StreamWriter::new(&p, false);
    for c in ['h', 'é', '✓'] {
        w.character(c)?;
    }

    let mut r = StreamReader::new(&p);
    r.select(ReadFormat::Character)?;
    let chars: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(
        chars,
        vec![Record::Char('h'), Record::Char('é'), Record::Char('✓')]
    );
    Ok(())
}

#[test]
fn undecodable_serialized_payload_is_a_decode_error() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("mixed.dat");
    let mut w = StreamWriter::new(&p, false);
    w.serialized(&"first".to_string())?;
    w.line("/w==")?;
    w.serialized(&"third".to_string())?;

    let mut r = StreamReader::new(&p);
    r.serialized()?;
    assert_eq!(r.current_value::<String>()?.as_deref(), Some("first"));
    let got: Vec<Result<String, StreamError>> = r.values().collect();
    assert_eq!(got.len(), 3);
    assert!(matches!(got[1], Err(StreamError::Decode { record: 1, .. })));
    assert_eq!(got[2].as_deref().ok(), Some("third"));
    Ok(())
}

#[test]
fn character_writer_truncates_once_per_session() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("ab.txt");
    fs::write(&p, "previous content")?;

    let mut w = StreamWriter::new(&p, false);
    w.character('A')?;
    w.character('B')?;
    assert_eq!(w.count(), 2);
    assert_eq!(fs::read_to_string(&p)?, "AB");
    Ok(())
}

#[test]
fn json_lines_round_trip() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("events.jsonl");
    let events = [
        json!({"id": 1, "tags": ["a", "b"]}),
        json!({"id": 2, "note": "line\nbreak"}),
    ];

    let mut w = StreamWriter::new(&p, false);
    for event in &events {
        w.json(event)?;
    }
    w.close()?;

    let mut r = StreamReader::new(&p);
    r.json()?;
    let got: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(
        got,
        events.iter().cloned().map(Record::Json).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn binary_round_trip_in_chunks() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("raw.bin");
    let mut w = StreamWriter::new(&p, false);
    w.binary(&[1, 2, 3, 4, 5])?;
    w.binary(&[0, 255])?;
    assert_eq!(w.size()?, 7);

    let mut r = StreamReader::new(&p);
    r.binary(3)?;
    let chunks: Vec<Record> = r.by_ref().collect::<Result<_, _>>()?;
    assert_eq!(
        chunks,
        vec![
            Record::Bytes(vec![1, 2, 3]),
            Record::Bytes(vec![4, 5, 0]),
            Record::Bytes(vec![255]),
        ]
    );
    Ok(())
}

fn rewind_after_one(reader: &mut StreamReader) -> Result<(Record, Vec<Record>), StreamError> {
    let first = match reader.next() {
        Some(record) => record?,
        None => return Err(StreamError::Argument("empty input".into())),
    };
    reader.rewind()?;
    assert_eq!(reader.key(), 0);
    let all = reader.by_ref().collect::<Result<Vec<_>, _>>()?;
    Ok((first, all))
}

#[test]
fn rewind_restarts_structured_formats() -> TestResult {
    let tmp = tempdir()?;

    let p = tmp.path().join("list.json");
    fs::write(&p, r#"[{"n": 1}, {"n": 2}, {"n": 3}]"#)?;
    let mut r = StreamReader::new(&p);
    r.json_array()?;
    let (first, all) = rewind_after_one(&mut r)?;
    assert_eq!(first, Record::Json(json!({"n": 1})));
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], first);

    let p = tmp.path().join("doc.xml");
    fs::write(&p, "<r><i>x</i><i>y</i></r>")?;
    let mut r = StreamReader::new(&p);
    r.xml("i")?;
    let (first, all) = rewind_after_one(&mut r)?;
    let texts: Vec<&str> = all.iter().map(|rec| rec.as_xml().unwrap().text.as_str()).collect();
    assert_eq!(texts, ["x", "y"]);
    assert_eq!(all[0], first);

    let p = tmp.path().join("rows.csv");
    fs::write(&p, "a,1\nb,2\nc,3\n")?;
    let mut r = StreamReader::new(&p);
    r.csv(CsvDialect::default())?;
    let (first, all) = rewind_after_one(&mut r)?;
    assert_eq!(first, Record::Fields(vec!["a".into(), "1".into()]));
    assert_eq!(all.len(), 3);
    assert_eq!(StreamReader::count(&r), 3);

    let p = tmp.path().join("kv.txt");
    fs::write(&p, "k=1\nskip\nv=2\n")?;
    let mut r = StreamReader::new(&p);
    r.regex(Regex::new(r"^(\w)=(\d)$")?)?;
    let (first, all) = rewind_after_one(&mut r)?;
    assert_eq!(first, Record::Captures(vec!["k=1".into(), "k".into(), "1".into()]));
    assert_eq!(all[0], first);
    assert_eq!(all.len(), 2);
    Ok(())
}

#[test]
fn seek_recovers_after_a_decode_error() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("partly.jsonl");
    fs::write(&p, "{\"a\":1}\nbad\n{\"c\":3}\n")?;

    let mut r = StreamReader::new(&p);
    r.json()?;
    assert!(matches!(r.advance(), Err(StreamError::Decode { .. })));
    assert!(!r.valid());

    r.seek(0)?;
    assert_eq!(r.key(), 0);
    assert_eq!(r.current(), Some(&Record::Json(json!({"a": 1}))));

    let err = r.seek(2).unwrap_err();
    assert!(matches!(err, StreamError::Decode { .. }), "{err}");
    Ok(())
}

#[test]
fn escaped_xml_text_round_trips() -> TestResult {
    let tmp = tempdir()?;
    let p = tmp.path().join("escaped.xml");
    let mut w = StreamWriter::new(&p, false);
    w.line("<doc>")?;
    w.xml(&XmlElement::new("t").with_text("< >"))?;
    w.xml(&XmlElement::new("t").with_text("a & b"))?;
    w.line("</doc>")?;

    let mut r = StreamReader::new(&p);
    r.xml("t")?;
    let texts: Vec<String> = r
        .by_ref()
        .map(|rec| rec.map(|rec| rec.as_xml().map(|e| e.text.clone()).unwrap_or_default()))
        .collect::<Result<_, _>>()?;
    assert_eq!(texts, ["< >", "a & b"]);
    Ok(())
}
