use lake_loader::{
    normalize::{NON_DATA_COLUMNS, normalize, sanitize_column_name},
    records::{DEFAULT_NULL_MARKERS, ReadOptions, SourceRecordSet, Value, read_csv},
};
use proptest::prelude::*;

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop_oneof![Just(f64::NAN), -1.0e6..1.0e6f64].prop_map(Value::Float),
        prop_oneof![
            Just("nan".to_string()),
            Just("NaT".to_string()),
            Just("-".to_string()),
            Just("#REF!".to_string()),
            Just("#DIV/0!".to_string()),
            "[a-z0-9 .-]{0,8}",
        ]
        .prop_map(Value::Text),
    ]
}

fn record_set_strategy() -> impl Strategy<Value = SourceRecordSet> {
    let name = prop_oneof![
        Just("@odata.etag".to_string()),
        Just("Errors".to_string()),
        "[A-Za-z#_ /%\\-]{0,10}",
    ];
    proptest::collection::vec(name, 1..6).prop_flat_map(|columns| {
        let width = columns.len();
        let rows = proptest::collection::vec(
            proptest::collection::vec(value_strategy(), width),
            0..8,
        );
        (Just(columns), rows)
            .prop_map(|(columns, rows)| SourceRecordSet::new(columns, rows))
    })
}

#[test]
fn extract_with_mixed_markers_loads_as_clean_text() {
    let text = "@odata.etag,ItemInternalId,#_Loan Amount-GBP/Month%,Close Date,Errors\n\
                e1,10,1500.50,2024-03-31,\n\
                e2,11,#DIV/0!,NaT,bad row\n\
                e3,12,NULL,-,\n";
    let records = read_csv(text.as_bytes(), &ReadOptions::default()).expect("read");
    let normalized = normalize(records);

    assert_eq!(
        normalized.columns(),
        &["Loan_AmountGBP_MonthPerc".to_string(), "Close_Date".to_string()]
    );
    assert_eq!(
        normalized.rows(),
        &[
            vec!["1500.50".to_string(), "2024-03-31".to_string()],
            vec!["0".to_string(), String::new()],
            vec![String::new(), String::new()],
        ]
    );
}

#[test]
fn every_default_missing_value_marker_loads_as_empty_text() {
    let markers = [
        "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
        "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ];
    for marker in markers {
        assert!(DEFAULT_NULL_MARKERS.contains(&marker), "{marker} is not a null marker");
    }

    let header = (0..markers.len()).map(|i| format!("c{i}")).collect::<Vec<_>>().join(",");
    let text = format!(
        "{header}\n{}\nkeep,{}\n",
        markers.join(","),
        ",".repeat(markers.len() - 2)
    );
    let records = read_csv(text.as_bytes(), &ReadOptions::default()).expect("read");
    let normalized = normalize(records);

    assert_eq!(normalized.row_count(), 2);
    assert_eq!(normalized.rows()[0], vec![String::new(); markers.len()]);
    assert_eq!(normalized.rows()[1][0], "keep");
}

#[test]
fn headline_column_name_sanitizes_in_rule_order() {
    assert_eq!(
        sanitize_column_name("#_Loan Amount-GBP/Month%"),
        "Loan_AmountGBP_MonthPerc"
    );
    assert_eq!(sanitize_column_name("Ref_x0023__No"), "RefNo");
}

proptest! {
    #[test]
    fn normalize_is_idempotent(source in record_set_strategy()) {
        let once = normalize(source);
        let twice = normalize(once.clone().into());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalized_sets_keep_shape_and_drop_metadata(source in record_set_strategy()) {
        let rows = source.row_count();
        let normalized = normalize(source);
        prop_assert_eq!(normalized.row_count(), rows);
        for column in normalized.columns() {
            prop_assert!(!column.is_empty());
            prop_assert!(!NON_DATA_COLUMNS.contains(&column.as_str()));
            prop_assert_eq!(&sanitize_column_name(column), column);
        }
        for row in normalized.rows() {
            prop_assert_eq!(row.len(), normalized.columns().len());
            for cell in row {
                prop_assert!(!["nan", "NaT", "-", "#REF!", "#DIV/0!"].contains(&cell.as_str()));
            }
        }
    }
}
