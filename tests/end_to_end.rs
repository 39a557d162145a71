mod common;

use futures::channel::mpsc;
use futures::StreamExt;
use image::ImageFormat;
use serde_json::{json, Value};

use common::{encoded_frame, plate_orchestrator, StubLocalizer, StubRecognizer};
use eagle_eye::{
    AnalysisStatus, ImageEncoding, InboundFormat, InboundMessage, RawFrame, SessionConfig,
    StreamSession,
};

#[tokio::test]
async fn frame_without_plate_reports_not_found() {
    let recognizer = StubRecognizer::reading("BKA123", 0.9);
    let orchestrator = plate_orchestrator(StubLocalizer::empty(), recognizer.clone());

    let frame = RawFrame::new(encoded_frame(640, 480, ImageFormat::Jpeg), ImageEncoding::Jpeg);
    let result = orchestrator.analyze(frame).await;
    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["status"], "success");
    assert_eq!(
        value["detections"],
        json!({"plate": {"found": false, "plate": "0", "coords": "0"}})
    );
    assert!(value["timestamp"].as_f64().unwrap() > 1.6e9);
    assert_eq!(recognizer.calls(), 0);
}

#[tokio::test]
async fn plate_reading_is_cleaned_and_formatted() {
    let orchestrator = plate_orchestrator(
        StubLocalizer::at(320.0, 240.0, 120.0, 40.0),
        StubRecognizer::reading("b k a 1 2 3", 0.74),
    );

    let frame = RawFrame::new(encoded_frame(640, 480, ImageFormat::Png), ImageEncoding::Auto);
    let result = orchestrator.analyze(frame).await;
    assert_eq!(result.status(), AnalysisStatus::Success);

    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    let plate = &value["detections"]["plate"];
    assert_eq!(plate["found"], true);
    assert_eq!(plate["plate"], "BKA-123");
    assert_eq!(plate["coords"], "320,240");
    assert_eq!(plate["ocr_backend"], "stub");
    assert!((plate["confidence"].as_f64().unwrap() - 0.74).abs() < 1e-6);
}

#[tokio::test]
async fn localizer_outage_is_recorded_not_raised() {
    let orchestrator = plate_orchestrator(
        StubLocalizer::failing("localizer returned HTTP 503"),
        StubRecognizer::reading("BKA123", 0.9),
    );

    let frame = RawFrame::new(encoded_frame(64, 48, ImageFormat::Png), ImageEncoding::Png);
    let result = orchestrator.analyze(frame).await;
    let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    // The plate pipeline is the only detector, so its failure fails the frame.
    assert_eq!(value["status"], "error");
    assert_eq!(value["detections"]["plate"]["found"], false);
    assert_eq!(value["failures"][0]["detector"], "plate");
    assert!(value["failures"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("HTTP 503"));
}

#[tokio::test]
async fn json_session_answers_in_receipt_order() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let orchestrator = plate_orchestrator(
        StubLocalizer::at(32.0, 24.0, 20.0, 10.0),
        StubRecognizer::reading("F4K372", 0.6),
    );
    let config = SessionConfig {
        inbound_format: InboundFormat::JsonBase64,
        ..SessionConfig::default()
    };
    let (in_tx, in_rx) = mpsc::unbounded();
    let (out_tx, out_rx) = mpsc::unbounded::<String>();

    let png = STANDARD.encode(encoded_frame(64, 48, ImageFormat::Png));
    in_tx
        .unbounded_send(InboundMessage::Text(
            json!({ "frame": format!("data:image/png;base64,{}", png) }).to_string(),
        ))
        .unwrap();
    in_tx
        .unbounded_send(InboundMessage::Text(json!({ "frame": "@@@" }).to_string()))
        .unwrap();

    let session = tokio::spawn(async move {
        let mut session = StreamSession::new(7, orchestrator, config);
        session.run(in_rx, out_tx).await
    });

    let mut replies = out_rx;
    let mut read = Vec::new();
    for _ in 0..2 {
        let text = replies.next().await.expect("reply");
        read.push(serde_json::from_str::<Value>(&text).unwrap());
    }
    drop(in_tx);
    let stats = session.await.unwrap();
    let rest: Vec<String> = replies.collect().await;

    assert_eq!(read[0]["status"], "success");
    assert_eq!(read[0]["detections"]["plate"]["plate"], "F4K-372");
    assert_eq!(read[1]["status"], "error");
    assert!(read[1]["message"].as_str().unwrap().contains("base64"));
    assert!(rest.is_empty());
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.frames_rejected, 0);
    assert_eq!(stats.results_sent, 2);
}
