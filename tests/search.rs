mod common;

use ao3_api::{Ao3ApiError, Constraint, Loadable, Search, SearchQuery, SortColumn, SortDirection};
use common::{MockTransport, blurb, html, search_page, session, work_page};

#[test]
fn word_count_range_is_honoured() {
    let mock = MockTransport::new();
    let hits = [(401u64, 6_000u64), (402, 9_500), (403, 14_999)];
    let blurbs: Vec<String> = hits
        .iter()
        .map(|(id, words)| blurb(*id, "Ranged", *words))
        .collect();
    mock.get("/works/search", html(&search_page(45, &blurbs)));
    for (id, words) in hits {
        mock.get(&format!("/works/{id}"), html(&work_page(id, "Ranged", words)));
    }

    let range = Constraint::between(5_000, 15_000).unwrap();
    let query = SearchQuery::new()
        .any_field("stars")
        .word_count(range)
        .sort(SortColumn::WordCount, SortDirection::Ascending);
    let session = session(&mock);
    let page = Search::new(query, session.clone()).execute(1).unwrap();

    assert_eq!(page.total_results, 45);
    assert_eq!(page.pages, 3);
    assert_eq!(page.results.len(), 3);
    for summary in &page.results {
        assert!(range.contains(summary.words.unwrap()));
        let work = summary.resolve(&session).unwrap();
        assert!(range.contains(work.words().unwrap().unwrap()));
    }

    let search_call = &mock.calls()[0];
    assert!(search_call.contains("work_search%5Bword_count%5D=5000-15000"));
    assert!(search_call.contains("work_search%5Bsort_column%5D=word_count"));
    assert!(!search_call.contains("page="));
}

#[test]
fn crossed_bounds_never_reach_the_network() {
    let mock = MockTransport::new();
    assert!(matches!(
        Constraint::between(100, 50),
        Err(Ao3ApiError::InvalidArgument(_))
    ));
    let search = Search::new(SearchQuery::new().any_field("x"), session(&mock));
    assert!(matches!(search.execute(0), Err(Ao3ApiError::InvalidArgument(_))));
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn empty_results_are_not_an_error() {
    let mock = MockTransport::new();
    mock.get(
        "/works/search",
        html(r#"<div id="main"><h3 class="heading">No results found</h3></div>"#),
    );
    let page = Search::new(SearchQuery::new().title("nothing"), session(&mock))
        .execute(2)
        .unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.total_results, 0);
    assert_eq!(page.pages, 0);
    assert!(page.results.is_empty());
    assert!(mock.calls()[0].contains("page=2"));
}

#[test]
fn threaded_search_returns_the_page() {
    let mock = MockTransport::new();
    mock.get(
        "/works/search",
        html(&search_page(1, &[blurb(500, "Only", 10)])),
    );
    let page = Search::new(SearchQuery::new(), session(&mock))
        .execute_threaded(1)
        .wait()
        .unwrap();
    assert_eq!(page.results[0].id, Some(500));
    assert_eq!(page.pages, 1);
    let work = page.results[0].resolve(&session(&mock)).unwrap();
    assert!(!work.is_loaded());
}

#[test]
fn summary_quoting_no_results_keeps_its_results() {
    let mock = MockTransport::new();
    let quoting = blurb(600, "Lost", 40).replace(
        "</dl>",
        r#"</dl><blockquote class="userstuff summary"><p>No results found in the archives.</p></blockquote>"#,
    );
    mock.get("/works/search", html(&search_page(1, &[quoting])));
    let page = Search::new(SearchQuery::new().any_field("lost"), session(&mock))
        .execute(1)
        .unwrap();
    assert_eq!(page.total_results, 1);
    assert_eq!(page.pages, 1);
    assert_eq!(page.results[0].id, Some(600));
}

#[test]
fn missing_totals_heading_is_a_parsing_error() {
    let mock = MockTransport::new();
    let blurbs: Vec<String> = (700..720).map(|id| blurb(id, "Untold", 10)).collect();
    mock.get(
        "/works/search",
        html(&format!(
            r#"<div id="main"><ol class="work index group">{}</ol></div>"#,
            blurbs.concat()
        )),
    );
    let search = Search::new(SearchQuery::new(), session(&mock));
    assert!(matches!(search.execute(1), Err(Ao3ApiError::Parsing(_))));
}
