use super::*;
use crate::{
    ResolvedLocation,
    config::SilentPeriod,
    ics::reader::parse_calendar,
    testing::{TZ, at, categorized},
};

fn serializer() -> CalendarSerializer {
    CalendarSerializer::new(CalendarConfig::default(), TZ)
}

fn weekend() -> Vec<NormalizedEvent> {
    let mut race = categorized("feed-a", "F1 Grand Prix", 24 * 60, 2, "F1", "Formula 1");
    race.location = ResolvedLocation {
        name: "Autódromo José Carlos Pace".to_string(),
        country: Some("Brasil".to_string()),
    };
    race.streaming_links = vec![
        "https://tv.example/d".to_string(),
        "https://tv.example/a".to_string(),
        "https://tv.example/c".to_string(),
        "https://tv.example/b".to_string(),
    ];
    race.sources = vec!["feed-b".to_string(), "feed-a".to_string()];

    vec![
        race,
        categorized("feed-a", "F1 Qualifying", 0, 2, "F1", "Formula 1"),
        categorized("feed-b", "Moto2 Qualifying", 0, 1, "MOTO2", "Moto2"),
        categorized("feed-a", "F2 Sprint Race", -120, 1, "F2", "Formula 2"),
    ]
}

#[test]
fn output_is_byte_identical_across_runs_and_input_orders() {
    let events = weekend();
    let mut shuffled = events.clone();
    shuffled.reverse();

    let s = serializer();
    let first = s.render(&s.build(&events));
    let second = s.render(&s.build(&events));
    let third = s.render(&s.build(&shuffled));

    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn entries_follow_the_ordering_chain() {
    let artifact = serializer().build(&weekend());
    let names: Vec<_> = artifact.entries.iter().map(|e| e.name.as_str()).collect();
    // Same instant: F1 sorts before MOTO2 by category code
    assert_eq!(
        names,
        vec!["F2 Sprint Race", "F1 Qualifying", "Moto2 Qualifying", "F1 Grand Prix"]
    );
}

#[test]
fn priority_then_content_id_break_full_ties() {
    let low = categorized("a", "F1 Race", 0, 1, "F1", "Formula 1");
    let high = categorized("b", "F1 Race", 0, 3, "F1", "Formula 1");
    let artifact = serializer().build(&[low, high]);

    assert_eq!(artifact.entries[0].priority, 3);
    assert_ne!(artifact.entries[0].uid, artifact.entries[1].uid);
    assert!(artifact.entries[1].uid.contains("-2@"));
}

#[test]
fn uid_depends_only_on_content() {
    let s = serializer();
    let a = s.build(&[categorized("a", "F1 Race", 0, 1, "F1", "Formula 1")]);
    let b = s.build(&[categorized("other", "F1  race", 0, 9, "F1", "Formula 1")]);
    let c = s.build(&[categorized("a", "F1 Race", 5, 1, "F1", "Formula 1")]);

    assert_eq!(a.entries[0].uid, b.entries[0].uid);
    assert_ne!(a.entries[0].uid, c.entries[0].uid);
    assert!(a.entries[0].uid.ends_with("@motorsport-ics"));
}

#[test]
fn links_are_sorted_deduplicated_and_capped() {
    let artifact = serializer().build(&weekend());
    let race = artifact
        .entries
        .iter()
        .find(|e| e.name == "F1 Grand Prix")
        .unwrap();
    assert_eq!(
        race.streaming_links,
        vec!["https://tv.example/a", "https://tv.example/b", "https://tv.example/c"]
    );
    assert_eq!(race.sources, vec!["feed-a", "feed-b"]);
    assert_eq!(race.location, "Autódromo José Carlos Pace, Brasil");
}

#[test]
fn races_get_the_longer_duration() {
    let artifact = serializer().build(&weekend());
    let minutes = |name: &str| {
        let e = artifact.entries.iter().find(|e| e.name == name).unwrap();
        (e.end - e.start).num_minutes()
    };
    assert_eq!(minutes("F1 Grand Prix"), 120);
    assert_eq!(minutes("F2 Sprint Race"), 120);
    assert_eq!(minutes("F1 Qualifying"), 60);
}

#[test]
fn silent_periods_hide_without_dropping() {
    let config = CalendarConfig {
        silent_periods: vec![SilentPeriod {
            categories: vec!["MOTO2".to_string()],
            ..Default::default()
        }],
        ..Default::default()
    };
    let s = CalendarSerializer::new(config, TZ);
    let artifact = s.build(&weekend());

    assert_eq!(artifact.entries.len(), 3);
    assert_eq!(artifact.suppressed.len(), 1);
    assert_eq!(artifact.suppressed[0].name, "Moto2 Qualifying");

    let ics = s.render(&artifact);
    assert!(!ics.contains("Moto2 Qualifying"));
    let json = s.render_json(&artifact).unwrap();
    assert!(json.contains("Moto2 Qualifying"));
}

#[test]
fn rendered_calendar_shape() {
    let s = serializer();
    let ics = s.render(&s.build(&weekend()));

    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.ends_with("END:VCALENDAR\r\n"));
    assert!(ics.contains("X-WR-TIMEZONE:America/Sao_Paulo\r\n"));
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 4);
    assert!(!ics.replace("\r\n", "").contains('\n'));

    // 14:00 in São Paulo is 17:00 UTC; DTSTAMP follows the start
    assert!(ics.contains("DTSTART:20250802T170000Z\r\n"));
    assert!(ics.contains("DTSTAMP:20250802T170000Z\r\n"));
    assert!(ics.contains("LOCATION:Autódromo José Carlos Pace\\, Brasil"));
}

#[test]
fn long_lines_fold_on_char_boundaries() {
    let name = "Fórmula 1 – Grande Prêmio de São Paulo – Corrida principal com transmissão ao vivo";
    let event = categorized("a", name, 0, 1, "F1", "Formula 1");
    let s = serializer();
    let ics = s.render(&s.build(&[event]));

    for line in ics.split("\r\n") {
        assert!(line.len() <= 75, "line too long: {}", line);
    }
    let parsed = parse_calendar(&ics).unwrap();
    assert_eq!(parsed.events[0].summary, name);
}

#[test]
fn text_escaping() {
    assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    assert_eq!(
        reader::unescape_text(&escape_text("Spa, Bélgica; 1\\2\n")),
        "Spa, Bélgica; 1\\2\n"
    );
}

#[test]
fn round_trip_preserves_uids_and_times() {
    let s = serializer();
    let artifact = s.build(&weekend());
    let parsed = parse_calendar(&s.render(&artifact)).unwrap();

    assert_eq!(parsed.timezone.as_deref(), Some("America/Sao_Paulo"));
    assert_eq!(parsed.name.as_deref(), Some("Motorsport Weekend"));
    assert_eq!(parsed.events.len(), artifact.entries.len());
    for (entry, event) in artifact.entries.iter().zip(&parsed.events) {
        assert_eq!(entry.uid, event.uid);
        assert_eq!(entry.start, event.start);
        assert_eq!(entry.end, event.end);
        assert_eq!(entry.name, event.summary);
    }
    assert_eq!(parsed.events[0].start, at(-120));
}

#[test]
fn empty_calendar_is_valid() {
    let s = serializer();
    let artifact = s.build(&[]);
    assert!(artifact.is_empty());
    let parsed = parse_calendar(&s.render(&artifact)).unwrap();
    assert!(parsed.events.is_empty());
}
