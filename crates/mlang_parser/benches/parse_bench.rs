use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mlang_lexer::TokenSnapshot;
use mlang_parser::{try_parse, ParseSettings};

// A medium-size query with the constructs that dominate real documents:
// let bindings, records, invocations, access chains, and a function.
const QUERY_SOURCE: &str = r#"
let
    Source = Csv.Document(File.Contents("sales.csv"), [Delimiter = ",", Columns = 8]),
    Promoted = Table.PromoteHeaders(Source, [PromoteAllScalars = true]),
    Typed = Table.TransformColumnTypes(
        Promoted,
        {{"Date", type date}, {"Region", type text}, {"Units", type number}, {"Price", type number}}
    ),
    WithRevenue = Table.AddColumn(Typed, "Revenue", each [Units] * [Price], type number),
    Filtered = Table.SelectRows(WithRevenue, each [Revenue] > 0 and [Region] <> "Internal"),
    Grouped = Table.Group(
        Filtered,
        {"Region"},
        {{"Total", each List.Sum([Revenue]), type number}, {"Orders", each Table.RowCount(_), type number}}
    ),
    Ranked = Table.Sort(Grouped, {{"Total", Order.Descending}}),
    TopRegions = Table.FirstN(Ranked, 10),
    Describe = (row as record) as text =>
        try Text.From(row[Region]) & ": " & Text.From(row[Total]) otherwise "unknown",
    Labels = Table.AddColumn(TopRegions, "Label", each Describe(_))
in
    Labels
"#;

fn bench_parse_query(c: &mut Criterion) {
    let snapshot = TokenSnapshot::new(QUERY_SOURCE).expect("bench source lexes");
    let settings = ParseSettings::default();
    c.bench_function("parse_query_medium", |b| {
        b.iter(|| {
            let parsed = try_parse(&settings, black_box(&snapshot));
            black_box(parsed).expect("bench source parses");
        });
    });
}

fn bench_lex_and_parse(c: &mut Criterion) {
    let settings = ParseSettings::default();
    c.bench_function("lex_and_parse_query_medium", |b| {
        b.iter(|| {
            let snapshot = TokenSnapshot::new(black_box(QUERY_SOURCE)).expect("bench source lexes");
            let parsed = try_parse(&settings, &snapshot);
            black_box(parsed).expect("bench source parses");
        });
    });
}

criterion_group!(benches, bench_parse_query, bench_lex_and_parse);
criterion_main!(benches);
