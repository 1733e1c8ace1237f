use solarmap::error::{SolarmapError, TransportError, Unavailable};

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        SolarmapError::config("x"),
        SolarmapError::Config { .. }
    ));
    assert!(matches!(SolarmapError::io("x"), SolarmapError::Io { .. }));
    assert!(matches!(
        SolarmapError::validation("f", "m"),
        SolarmapError::Validation { .. }
    ));
    assert!(matches!(
        SolarmapError::unknown_register("x"),
        SolarmapError::UnknownRegister { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    assert!(matches!(
        SolarmapError::out_of_range("x"),
        SolarmapError::ValueOutOfRange { .. }
    ));
    assert!(matches!(
        SolarmapError::invalid_input("x"),
        SolarmapError::InvalidEncodingInput { .. }
    ));
    assert!(matches!(
        SolarmapError::invalid_setting("s", "m"),
        SolarmapError::InvalidSetting { .. }
    ));
    let unavailable: SolarmapError = Unavailable::new("gone").into();
    assert!(matches!(unavailable, SolarmapError::Unavailable(_)));
}

#[test]
fn transport_errors_are_distinct() {
    assert!(matches!(
        TransportError::io("x"),
        TransportError::Io { .. }
    ));
    assert!(matches!(
        TransportError::timeout("read"),
        TransportError::Timeout { .. }
    ));
    assert_ne!(TransportError::NotConnected, TransportError::io("x"));
}

#[test]
fn display_messages() {
    let e = SolarmapError::validation("field", "bad");
    assert!(e.to_string().contains("Validation error"));

    let e = SolarmapError::from(TransportError::Exception {
        code: "IllegalDataAddress".to_string(),
    });
    assert!(e.to_string().contains("IllegalDataAddress"));

    let e = SolarmapError::from(Unavailable::new("read of input at 31000 failed"));
    assert_eq!(e.to_string(), "Unavailable: read of input at 31000 failed");
}
