use chrono::{Duration, Local};
use ofxfetch_api::timestamp::format_timestamp;
use ofxfetch_api::types::{Account, Capability, Site};
use ofxfetch_api::{DateWindow, RequestKind, Session};

fn cc_site() -> Site {
    Site {
        name: "CARDCO".to_string(),
        fi_org: "CardCo".to_string(),
        fid: "7101".to_string(),
        url: "https://ofx.cardco.example/ofx".to_string(),
        ofx_version: "102".to_string(),
        app_id: "QWIN".to_string(),
        app_ver: "2200".to_string(),
        bank_id: None,
        broker_id: None,
        client_uid: None,
        capabilities: vec![Capability::CreditCardStatement],
        min_interval: 0,
        time_offset: None,
    }
}

#[test]
fn credit_card_request_end_to_end() {
    let account = Account {
        site: "CARDCO".to_string(),
        number: "4111".to_string(),
        account_type: String::new(),
        username: "alice".to_string(),
        password: "pa55".to_string(),
    };
    let window = DateWindow::last_days(30);
    let request = Session::new()
        .build_request(&cc_site(), &account, &window)
        .unwrap();
    assert_eq!(request.kind, RequestKind::CreditCard);

    let text = request.to_text();
    let signon_start = text.find("<SIGNONMSGSRQV1>").unwrap();
    let signon_end = text.find("</SIGNONMSGSRQV1>").unwrap();
    let signon = &text[signon_start..signon_end];
    assert!(signon.contains("<USERID>alice"));
    assert!(signon.contains("<USERPASS>pa55"));
    assert!(signon.contains("<LANGUAGE>ENG"));
    assert!(signon.contains("<FI><ORG>CardCo<FID>7101</FI>"));

    let expected_start = (Local::now().date_naive() - Duration::days(30))
        .format("%Y%m%d")
        .to_string();
    let body = &text[signon_end..];
    assert!(body.contains("<CCSTMTRQ><CCACCTFROM><ACCTID>4111</CCACCTFROM>"));
    assert!(body.contains(&format!("<DTSTART>{}000000", expected_start)));
    assert_eq!(format_timestamp(window.start), format!("{}000000", expected_start));
}
