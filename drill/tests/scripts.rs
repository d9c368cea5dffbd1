use drill::{parse_script, parse_script_with, ParseError};
use drill_core::{
    script::{Direction, EventKind, PacketSpec},
    Config,
};

#[test]
#[ntest::timeout(1000)]
fn fixtures_parse() -> Result<(), ParseError> {
    let tcp = parse_script(include_str!("scripts/passive_open.pkt"))?;
    assert_eq!(tcp.events.len(), 7);
    assert!(tcp.options.is_empty());

    let (sctp, config) = parse_script_with(
        include_str!("scripts/sctp_passive_open.pkt"),
        Config::default(),
    )?;
    assert_eq!(config.tolerance_usecs, 10_000);
    let outbound = sctp
        .events
        .iter()
        .filter(|event| {
            matches!(
                &event.kind,
                EventKind::Packet(packet)
                    if packet.direction == Direction::Outbound
                        && matches!(packet.spec, PacketSpec::Sctp(_))
            )
        })
        .count();
    assert_eq!(outbound, 3);

    let udp = parse_script(include_str!("scripts/udp_echo.pkt"))?;
    assert!(matches!(&udp.events[4].kind, EventKind::Packet(packet) if packet.direction == Direction::Outbound));
    Ok(())
}

#[test]
#[ntest::timeout(1000)]
fn bad_lines_stop_the_parse() {
    let error = |text: &str| parse_script(text).unwrap_err().to_string();
    let prefix = include_str!("scripts/passive_open.pkt");
    assert_eq!(
        error(&format!("{prefix}+0 < P. 1:101(50) ack 1\n")),
        "Line 11: inconsistent TCP sequence numbers and payload size"
    );
    assert_eq!(
        error(&format!("{prefix}* < . 1:1(0) ack 1\n")),
        "Line 11: event time <star> can only be used with outbound packets"
    );
    assert_eq!(
        error("0 < S 0:0(0) <...>\n"),
        "Line 1: <...> for TCP options can only be used with outbound packets"
    );
    assert_eq!(
        error("0 > sctp: DATA[flgs=BE, len=12, tsn=1, sid=0, ssn=0, ppid=0]\n"),
        "Line 1: length value out of range"
    );
}
