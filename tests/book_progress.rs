use interactive_book::book::{InteractiveBook, Step};
use interactive_book::config::BookConfig;
use interactive_book::content::{ContentResult, ScriptedContentFactory};
use interactive_book::events::{BookEvent, EventKind, EventLog};
use interactive_book::fragment::{self, Fragment};
use interactive_book::location::{MemoryAddressBar, SharedAddressBar};
use interactive_book::navigation::NavigationTarget;
use interactive_book::progress::ChapterStatus;
use interactive_book::snapshot::BookSnapshot;
use interactive_book::xapi::Verb;

fn open(yaml: &str) -> (InteractiveBook, EventLog) {
    let config = BookConfig::from_yaml(yaml).unwrap();
    let page = SharedAddressBar::new(MemoryAddressBar::parse("https://lms.test/page").unwrap());
    let mut book = InteractiveBook::new(config, Box::new(page), &ScriptedContentFactory);
    let log = book.record_events();
    book.attach();
    (book, log)
}

fn go(book: &mut InteractiveBook, chapter: &str) {
    book.request_navigation(NavigationTarget::new(book.content_id(), chapter));
    book.advance_clock(50);
    let active = book.active_chapter();
    assert!(book.on_transition_end("transform", active));
}

fn answer(book: &mut InteractiveBook, sub_content_id: &str, score: u32) -> bool {
    book.on_content_event(
        sub_content_id,
        Verb::Answered,
        Some(ContentResult {
            score,
            max_score: None,
        }),
    )
}

fn completed_chapters(log: &EventLog) -> Vec<(usize, u32, u32)> {
    log.snapshot()
        .into_iter()
        .filter_map(|e| match e {
            BookEvent::ChapterCompleted {
                chapter,
                score,
                max_score,
                ..
            } => Some((chapter, score, max_score)),
            _ => None,
        })
        .collect()
}

fn statuses_of(log: &EventLog, chapter: usize) -> Vec<ChapterStatus> {
    log.snapshot()
        .into_iter()
        .filter_map(|e| match e {
            BookEvent::ChapterStatusChanged { chapter: c, status } if c == chapter => Some(status),
            _ => None,
        })
        .collect()
}

const THREE_CHAPTERS: &str = r#"
contentId: 3
title: Quiz basics
chapters:
  - id: intro
    sections: [{ id: text }]
  - id: quiz
    sections:
      - { id: q1, maxScore: 2 }
      - { id: q2, maxScore: 3 }
  - id: outro
    sections: [{ id: bye }]
"#;

#[test]
fn chapter_with_two_tasks_goes_blank_started_done_and_completes_once() {
    let (mut book, log) = open(THREE_CHAPTERS);
    go(&mut book, "quiz");
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Blank));

    assert!(answer(&mut book, "q1", 2));
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Started));
    assert!(completed_chapters(&log).iter().all(|(c, ..)| *c != 1));

    assert!(answer(&mut book, "q2", 1));
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Done));
    assert_eq!(
        statuses_of(&log, 1),
        vec![ChapterStatus::Started, ChapterStatus::Done]
    );
    let quiz: Vec<_> = completed_chapters(&log)
        .into_iter()
        .filter(|(c, ..)| *c == 1)
        .collect();
    assert_eq!(quiz, vec![(1, 3, 5)]);
}

#[test]
fn repeated_task_reports_never_increase_or_underflow_tasks_left() {
    let (mut book, _log) = open(THREE_CHAPTERS);
    go(&mut book, "quiz");

    let mut previous = book.chapters().get(1).unwrap().tasks_left;
    for id in ["q1", "q1", "q2", "q2", "q1", "text", "unknown"] {
        answer(&mut book, id, 1);
        let left = book.chapters().get(1).unwrap().tasks_left;
        assert!(left <= previous);
        previous = left;
    }
    assert_eq!(previous, 0);
    assert!(!answer(&mut book, "q2", 3));
}

#[test]
fn content_events_only_match_the_active_chapter() {
    let (mut book, log) = open(THREE_CHAPTERS);
    assert!(!answer(&mut book, "q1", 2));
    assert_eq!(book.chapters().get(1).unwrap().tasks_left, 2);
    assert_eq!(log.count(EventKind::SectionTaskDone), 0);
}

#[test]
fn arriving_at_the_final_content_only_chapter_completes_the_book() {
    let yaml = r#"
contentId: 9
title: Final reading chapter
chapters:
  - id: one
    sections: [{ id: a, maxScore: 1 }]
  - id: two
    sections: [{ id: b, maxScore: 1 }]
  - id: three
    sections: [{ id: c }]
"#;
    let (mut book, log) = open(yaml);
    assert!(answer(&mut book, "a", 1));
    book.navigate_sequential(Step::Next, false);
    book.advance_clock(50);
    book.on_transition_end("transform", 1);
    assert!(answer(&mut book, "b", 1));
    assert!(!book.is_completed());

    book.navigate_sequential(Step::Next, false);
    assert_eq!(book.chapter_status(2), Some(ChapterStatus::Done));
    assert!(book.is_completed());
    assert_eq!(log.count(EventKind::BookCompleted), 1);

    let Some(BookEvent::BookCompleted {
        score,
        max_score,
        report,
    }) = log
        .snapshot()
        .into_iter()
        .find(|e| e.kind() == EventKind::BookCompleted)
    else {
        panic!("book completed event missing");
    };
    assert_eq!((score, max_score), (2, 2));
    assert_eq!(report.statement.verb(), Some(Verb::Completed));
    assert_eq!(report.children.len(), 3);
}

const MANUAL: &str = r#"
contentId: 4
title: Manual
behaviour:
  progressIndicators: true
  progressAuto: false
chapters:
  - id: a
    sections: [{ id: qa, maxScore: 1 }]
  - id: b
    sections: [{ id: tb }]
  - id: c
    sections: [{ id: tc }]
"#;

#[test]
fn marking_a_chapter_twice_notifies_once() {
    let (mut book, log) = open(MANUAL);
    assert!(book.set_chapter_read(1));
    assert!(book.set_chapter_read(1));
    assert_eq!(log.count(EventKind::ChapterCompleted), 1);
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Done));
}

#[test]
fn book_completes_only_when_every_chapter_is_marked() {
    let (mut book, log) = open(MANUAL);
    book.set_chapter_read(0);
    book.set_chapter_read(1);
    book.unset_chapter_read(1);
    book.set_chapter_read(2);
    assert!(!book.is_completed());
    assert_eq!(log.count(EventKind::BookCompleted), 0);
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Blank));

    book.set_chapter_read(1);
    assert!(book.is_completed());
    assert_eq!(log.count(EventKind::BookCompleted), 1);

    book.unset_chapter_read(0);
    assert!(!book.is_completed());
    assert_eq!(log.count(EventKind::BookCompleted), 1);
}

#[test]
fn manual_mode_reports_started_but_never_auto_completes() {
    let (mut book, log) = open(MANUAL);
    assert!(answer(&mut book, "qa", 1));
    assert_eq!(book.chapter_status(0), Some(ChapterStatus::Started));
    assert_eq!(log.count(EventKind::ChapterCompleted), 0);
}

#[test]
fn manual_marks_are_ignored_in_auto_mode() {
    let yaml = r#"
contentId: 6
chapters:
  - id: a
    sections: [{ id: q, maxScore: 1 }]
  - id: b
    sections: [{ id: t }]
"#;
    let (mut book, log) = open(yaml);
    assert!(answer(&mut book, "q", 1));
    assert_eq!(completed_chapters(&log), vec![(0, 1, 1)]);

    assert!(!book.unset_chapter_read(0));
    assert!(book.chapters().get(0).unwrap().completed);
    assert_eq!(book.chapter_status(0), Some(ChapterStatus::Done));
    assert!(!book.set_chapter_read(1));
    assert_eq!(book.chapter_status(1), Some(ChapterStatus::Blank));

    go(&mut book, "b");
    assert_eq!(completed_chapters(&log), vec![(0, 1, 1), (1, 0, 0)]);
    assert_eq!(log.count(EventKind::BookCompleted), 1);
}

#[test]
fn indicators_off_tracks_nothing() {
    let yaml = r#"
contentId: 5
behaviour: { progressIndicators: false }
chapters:
  - id: a
    sections: [{ id: q, maxScore: 1 }]
"#;
    let (mut book, log) = open(yaml);
    assert!(!answer(&mut book, "q", 1));
    assert_eq!(book.score(), 1);
    assert_eq!(log.count(EventKind::ChapterStatusChanged), 0);
}

#[test]
fn host_protocol_aggregates_every_chapter() {
    let (mut book, _log) = open(THREE_CHAPTERS);
    assert_eq!(book.max_score(), 5);
    assert_eq!(book.score(), 0);
    assert!(!book.answer_given());

    go(&mut book, "quiz");
    answer(&mut book, "q1", 2);
    answer(&mut book, "q2", 9);
    assert_eq!(book.score(), 5);
    assert!(book.answer_given());

    let report = book.xapi_data();
    assert_eq!(report.statement.verb(), Some(Verb::Answered));
    assert_eq!(report.statement.raw_score(), Some(5));
    assert_eq!(report.statement.max_score(), Some(5));
    assert_eq!(report.children[1].children.len(), 2);
    assert_eq!(report.statement.object.id, "urn:h5p:3");
}

#[test]
fn reset_clears_progress_and_scores() {
    let (mut book, log) = open(THREE_CHAPTERS);
    go(&mut book, "quiz");
    answer(&mut book, "q1", 2);
    answer(&mut book, "q2", 3);

    book.reset();
    assert_eq!(log.count(EventKind::IndicatorsReset), 1);
    assert_eq!(book.score(), 0);
    assert!(!book.is_completed());
    assert!((0..3).all(|i| book.chapter_status(i) == Some(ChapterStatus::Blank)));
    assert_eq!(book.chapters().get(1).unwrap().tasks_left, 2);

    assert!(answer(&mut book, "q1", 1));
}

#[test]
fn restore_brings_back_progress_without_notifications() {
    let (mut book, _log) = open(THREE_CHAPTERS);
    go(&mut book, "quiz");
    answer(&mut book, "q1", 2);
    answer(&mut book, "q2", 3);
    let snapshot = book.snapshot();
    assert_eq!(snapshot.active_chapter, "quiz");

    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: BookSnapshot = serde_json::from_str(&json).unwrap();

    let (mut fresh, log) = open(THREE_CHAPTERS);
    log.drain();
    fresh.restore(&restored);
    assert_eq!(fresh.active_chapter(), 1);
    assert_eq!(fresh.chapter_status(1), Some(ChapterStatus::Done));
    assert_eq!(fresh.chapters().get(1).unwrap().tasks_left, 0);
    assert_eq!(log.count(EventKind::ChapterCompleted), 0);
    assert_eq!(log.count(EventKind::ChapterStatusChanged), 0);
}

#[test]
fn fragments_survive_encoding() {
    let targets = [
        NavigationTarget::new(7, "abc"),
        NavigationTarget::new(7, "abc").with_section("top"),
        NavigationTarget::new(12, "ch-2")
            .with_section("s9")
            .with_header_number(3),
    ];
    for target in targets {
        let original = target.to_fragment();
        let encoded = fragment::encode(&original);
        let decoded = fragment::decode(&encoded);
        assert_eq!(
            decoded.iter().collect::<Vec<_>>(),
            original.iter().collect::<Vec<_>>(),
            "{encoded}"
        );
    }
}

#[test]
fn well_formed_and_malformed_fragments_decode_as_expected() {
    let decoded = fragment::decode("#h5pbookid=7&chapter=abc&section=top");
    assert!(fragment::validate(&decoded, 7));
    let expected: Fragment = [("h5pbookid", "7"), ("chapter", "abc"), ("section", "top")]
        .into_iter()
        .collect();
    assert_eq!(decoded, expected);

    let decoded = fragment::decode("#chapter&foo=bar");
    let expected: Fragment = [("foo", "bar")].into_iter().collect();
    assert_eq!(decoded, expected);
}
