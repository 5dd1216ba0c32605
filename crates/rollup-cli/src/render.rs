use std::borrow::Cow;
use std::io::{self, Write};

use rollup_engine::{GroupingSpec, ResultSet};

/// One block per spec: a `#` summary line, a header row, then one tab-separated row per group.
pub fn write_text<W: Write>(out: &mut W, specs: &[GroupingSpec], results: &[ResultSet]) -> io::Result<()> {
    for (idx, (spec, result)) in specs.iter().zip(results).enumerate() {
        if idx > 0 {
            writeln!(out)?;
        }
        writeln!(out, "# {}: {} groups", spec.describe(), result.len())?;
        if !result.unknown_fields().is_empty() {
            writeln!(out, "# ignored: {}", result.unknown_fields().join(", "))?;
        }
        let header: Vec<Cow<'_, str>> = result.columns().iter().map(|name| escape(name)).collect();
        writeln!(out, "{}", header.join("\t"))?;
        for record in result.records() {
            let cells: Vec<String> = result
                .columns()
                .iter()
                .map(|name| escape(&record.get_or_blank(name).to_key_string()).into_owned())
                .collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
    }
    Ok(())
}

/// Backslash-escapes the characters that would break a tab-separated line.
fn escape(cell: &str) -> Cow<'_, str> {
    if !cell.contains(['\\', '\t', '\n', '\r']) {
        return Cow::Borrowed(cell);
    }
    let mut escaped = String::with_capacity(cell.len() + 2);
    for ch in cell.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

/// A single spec prints its result array; several specs print an array of result arrays.
pub fn write_json<W: Write>(out: &mut W, results: &[ResultSet]) -> io::Result<()> {
    match results {
        [single] => serde_json::to_writer(&mut *out, single)?,
        many => serde_json::to_writer(&mut *out, many)?,
    }
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_engine::{aggregate, Record, Value};

    use pretty_assertions::assert_eq;

    fn rows() -> Vec<Record> {
        vec![
            Record::from([("segment", Value::from("A")), ("sales", Value::from(1.5))]),
            Record::from([("segment", Value::from("B")), ("sales", Value::from(2))]),
            Record::from([("segment", Value::from("A")), ("sales", Value::from(3))]),
        ]
    }

    #[test]
    fn text_output_is_tab_separated_per_spec() {
        let specs = vec![
            GroupingSpec::new(["segment"], ["sales"]),
            GroupingSpec::new(["segment", "quarter"], Vec::<String>::new()),
        ];
        let results: Vec<ResultSet> = specs
            .iter()
            .map(|spec| aggregate(&rows(), spec).unwrap())
            .collect();

        let mut out = Vec::new();
        write_text(&mut out, &specs, &results).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# categoryKeys [segment] and valueKeys [sales]: 2 groups\n\
             segment\tsales\n\
             A\t4.5\n\
             B\t2\n\
             \n\
             # categoryKeys [segment, quarter] and valueKeys []: 2 groups\n\
             # ignored: quarter\n\
             segment\n\
             A\n\
             B\n"
        );
    }

    #[test]
    fn text_cells_escape_tabs_and_line_breaks() {
        let rows = vec![Record::from([
            ("note", Value::from("a\tb\nc\\d\r")),
            ("sales", Value::from(1)),
        ])];
        let spec = GroupingSpec::new(["note"], ["sales"]);
        let result = aggregate(&rows, &spec).unwrap();

        let mut out = Vec::new();
        write_text(&mut out, std::slice::from_ref(&spec), &[result]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().nth(2), Some("a\\tb\\nc\\\\d\\r\t1"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn json_output_nests_only_for_several_specs() {
        let spec = GroupingSpec::new(["segment"], ["sales"]);
        let result = aggregate(&rows(), &spec).unwrap();

        let mut out = Vec::new();
        write_json(&mut out, std::slice::from_ref(&result)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[{\"segment\":\"A\",\"sales\":4.5},{\"segment\":\"B\",\"sales\":2}]\n"
        );

        let mut out = Vec::new();
        write_json(&mut out, &[result.clone(), result]).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
        assert!(parsed[0].is_array());
    }
}
