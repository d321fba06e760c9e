use ragdb_text::{Bm25Index, Bm25Params};

const CATS: [&str; 3] = ["cats chase mice", "dogs chase cats", "birds fly high"];

#[test]
fn cats_scenario_ranks_both_matching_chunks() {
    let index = Bm25Index::build(&CATS, Bm25Params::default());
    let hits = index.top_k("cats", 2);

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, 0);
    assert_eq!(hits[1].0, 1);
    assert!(hits.iter().all(|(_, s)| *s > 0.0));
    assert_eq!(index.scores("cats")[2], 0.0, "chunk without the term scores zero");
}

#[test]
fn common_term_idf_is_floored_by_epsilon() {
    let index = Bm25Index::build(&CATS, Bm25Params::default());
    // df=2 of N=3 gives a negative raw idf; df=1 gives ln(2.5/1.5).
    let rare = (2.5f64).ln() - (1.5f64).ln();
    let common_raw = -rare;
    let average = (2.0 * common_raw + 5.0 * rare) / 7.0;
    let expected = 0.25 * average;

    let idf = index.idf("cats").unwrap();
    assert!((idf - expected).abs() < 1e-12, "idf {idf} != {expected}");
    assert!((index.idf("mice").unwrap() - rare).abs() < 1e-12);
    assert!(index.idf("zebra").is_none());

    // equal lengths and tf=1 reduce the per-term factor to exactly 1
    let scores = index.scores("cats");
    assert!((scores[0] - expected).abs() < 1e-12);
    assert!((scores[1] - expected).abs() < 1e-12);
}

#[test]
fn empty_corpus_returns_nothing() {
    let empty: [&str; 0] = [];
    let index = Bm25Index::build(&empty, Bm25Params::default());
    assert!(index.is_empty());
    assert!(index.top_k("anything", 5).is_empty());
    assert!(index.scores("anything").is_empty());
}

#[test]
fn empty_query_and_unknown_terms_return_nothing() {
    let index = Bm25Index::build(&CATS, Bm25Params::default());
    assert!(index.top_k("", 3).is_empty());
    assert!(index.top_k("   ", 3).is_empty());
    assert!(index.top_k("zebra", 3).is_empty());
}

#[test]
fn scoring_is_deterministic() {
    let corpus: Vec<String> = (0..40).map(|i| format!("doc {i} alpha beta {} gamma", "delta ".repeat(i % 5))).collect();
    let index = Bm25Index::build(&corpus, Bm25Params::default());
    let first = index.top_k("alpha delta gamma", 10);
    for _ in 0..10 {
        let again = Bm25Index::build(&corpus, Bm25Params::default()).top_k("alpha delta gamma", 10);
        assert_eq!(again, first);
        assert_eq!(index.top_k("alpha delta gamma", 10), first);
    }
}

#[test]
fn extra_occurrence_never_lowers_the_score() {
    let others = ["banana date fig", "grape kiwi lemon"];
    let mut previous = 0.0;
    for tf in 1..6 {
        let doc = format!("{} banana cherry", "apple ".repeat(tf));
        let corpus = [doc.as_str(), others[0], others[1]];
        let score = Bm25Index::build(&corpus, Bm25Params::default()).scores("apple")[0];
        assert!(score > 0.0);
        assert!(score >= previous, "tf={tf}: {score} < {previous}");
        previous = score;
    }
}

#[test]
fn ties_keep_corpus_order() {
    let corpus = ["red fish", "blue fish", "one fish", "two fish", "no match here"];
    let hits = Bm25Index::build(&corpus, Bm25Params::default()).top_k("fish", 10);
    let order: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn repeated_query_terms_count_repeatedly() {
    let index = Bm25Index::build(&CATS, Bm25Params::default());
    let once = index.scores("mice")[0];
    let twice = index.scores("mice mice")[0];
    assert!((twice - 2.0 * once).abs() < 1e-12);
}

#[test]
fn query_is_case_insensitive_and_results_are_truncated() {
    let corpus = ["Rust borrow checker", "rust ownership rules", "rust lifetimes", "python gil"];
    let index = Bm25Index::build(&corpus, Bm25Params::default());
    let hits = index.top_k("RUST borrow", 2);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, 0);
    assert!(hits[0].1 > hits[1].1);
}
