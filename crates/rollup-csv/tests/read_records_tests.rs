use std::io::Write;

use pretty_assertions::assert_eq;
use rollup_csv::{read_path, read_records, CsvOptions, CsvSourceError};
use rollup_engine::{aggregate, GroupingSpec, Record, Value};

const ORDERS: &str = "\
Order ID,Segment,Region,Sales,Quantity,Discount,Returned
CA-2016-152156,Consumer,South,261.96,2,0,false
CA-2016-152156,Consumer,South,731.94,3,0,false
CA-2016-138688,Corporate,West,14.62,2,0,TRUE
US-2015-108966,Consumer,South,957.5775,5,0.45,false
US-2015-108966,Consumer,South,22.368,2,0.2,
CA-2014-115812,Home Office,West,48.86,7,N/A,false
";

fn read(input: &str) -> Result<Vec<Record>, CsvSourceError> {
    read_records(input.as_bytes(), &CsvOptions::default())
}

#[test]
fn reads_header_keyed_records_with_dynamic_types() {
    let records = read(ORDERS).unwrap();
    assert_eq!(records.len(), 6);

    let first = &records[0];
    assert_eq!(
        first.field_names().collect::<Vec<_>>(),
        vec!["Order ID", "Segment", "Region", "Sales", "Quantity", "Discount", "Returned"]
    );
    assert_eq!(first.get("Order ID"), Some(&Value::from("CA-2016-152156")));
    assert_eq!(first.get("Sales"), Some(&Value::from(261.96)));
    assert_eq!(first.get("Quantity"), Some(&Value::from(2)));
    assert_eq!(first.get("Returned"), Some(&Value::from(false)));

    assert_eq!(records[2].get("Returned"), Some(&Value::from(true)));
    assert_eq!(records[4].get("Returned"), Some(&Value::Blank));
    assert_eq!(records[5].get("Discount"), Some(&Value::from("N/A")));
}

#[test]
fn dynamic_typing_can_be_disabled() {
    let options = CsvOptions {
        dynamic_typing: false,
        ..CsvOptions::default()
    };
    let records = read_records(ORDERS.as_bytes(), &options).unwrap();
    assert_eq!(records[0].get("Sales"), Some(&Value::from("261.96")));
    assert_eq!(records[4].get("Returned"), Some(&Value::from("")));
}

#[test]
fn honors_custom_delimiter() {
    let options = CsvOptions {
        delimiter: b';',
        ..CsvOptions::default()
    };
    let records = read_records("a;b\nx;1\n".as_bytes(), &options).unwrap();
    assert_eq!(
        records,
        vec![Record::from([("a", Value::from("x")), ("b", Value::from(1))])]
    );
}

#[test]
fn header_only_input_yields_no_records() {
    assert_eq!(read("segment,sales\n").unwrap(), Vec::<Record>::new());
}

#[test]
fn empty_input_is_rejected() {
    assert!(matches!(read(""), Err(CsvSourceError::EmptyInput)));
}

#[test]
fn short_and_long_rows_are_rejected() {
    let err = read("a,b,c\n1,2,3\n4,5\n").unwrap_err();
    assert!(
        matches!(
            err,
            CsvSourceError::FieldCount {
                row: 3,
                expected: 3,
                actual: 2
            }
        ),
        "{err:?}"
    );

    let err = read("a,b\n1,2,3\n").unwrap_err();
    assert!(matches!(err, CsvSourceError::FieldCount { row: 2, .. }), "{err:?}");
}

#[test]
fn skips_blank_lines() {
    let records = read("a,b\n1,2\n\n3,4\n\n").unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn quoted_fields_keep_delimiters_and_stay_typed() {
    let records = read("name,amount\n\"Smith, J\",\"12.5\"\n").unwrap();
    assert_eq!(records[0].get("name"), Some(&Value::from("Smith, J")));
    assert_eq!(records[0].get("amount"), Some(&Value::from(12.5)));
}

#[test]
fn reads_from_a_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(ORDERS.as_bytes()).unwrap();
    file.flush().unwrap();

    let records = read_path(file.path(), &CsvOptions::default()).unwrap();
    assert_eq!(records.len(), 6);
}

#[test]
fn missing_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_path(dir.path().join("nope.csv"), &CsvOptions::default()).unwrap_err();
    assert!(matches!(err, CsvSourceError::Io(_)));
}

#[test]
fn parsed_records_feed_the_aggregation_engine() {
    let records = read(ORDERS).unwrap();
    let spec = GroupingSpec::new(["Segment", "Region"], ["Quantity", "Discount"]);
    let result = aggregate(&records, &spec).unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!([
            {"Segment": "Consumer", "Region": "South", "Quantity": 12, "Discount": 0.65},
            {"Segment": "Corporate", "Region": "West", "Quantity": 2, "Discount": 0},
            {"Segment": "Home Office", "Region": "West", "Quantity": 7, "Discount": "N/A"},
        ])
    );
}
