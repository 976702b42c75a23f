use super::*;
use crate::error::DecodeError;
use crate::models::Rotation;
use crate::primitives::AssistHit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type DecodeResult = Result<Option<PrimitiveHit>, DecodeError>;

fn blank(w: usize, h: usize, ts: u64) -> Frame {
    Frame::new(w, h, Rotation::R0, ts, vec![255; w * h])
}

fn nothing(_: &DecodeRequest<'_>) -> DecodeResult {
    Ok(None)
}

fn box_only(_: &DecodeRequest<'_>) -> DecodeResult {
    Ok(Some(PrimitiveHit::detected(RoiRect::new(200, 140, 440, 380), None)))
}

struct ScriptedAssist {
    calls: Arc<AtomicUsize>,
    reply: fn() -> Result<Option<AssistHit>, AssistError>,
}

impl AssistedDetector for ScriptedAssist {
    fn detect(&mut self, _patch: &GrayImage) -> Result<Option<AssistHit>, AssistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

fn square_quad(a: f32, b: f32) -> Quad {
    Quad::new(Point::new(a, a), Point::new(b, a), Point::new(b, b), Point::new(a, b))
}

#[test]
fn test_unusable_frame_is_an_error() {
    let mut p = ScanPipeline::with_defaults(nothing);
    let short = Frame::new(10, 10, Rotation::R0, 0, vec![0; 50]);
    assert!(matches!(p.process_frame(&short), Err(ScanError::UnusableInput { .. })));
    let empty = Frame::new(0, 10, Rotation::R0, 0, Vec::new());
    assert!(p.process_frame(&empty).is_err());
    assert_eq!(p.stats().frames, 0);
}

#[test]
fn test_base_decode_echoes_frame_metadata() {
    let decoder = |req: &DecodeRequest<'_>| -> DecodeResult {
        assert_eq!(req.effort, Effort::Base);
        Ok(Some(PrimitiveHit::decoded("hello", RoiRect::new(-10, 20, 100, 120), None)))
    };
    let mut p = ScanPipeline::with_defaults(decoder);
    let crop = RoiRect::new(0, 0, 320, 240);
    let frame = Frame::new(320, 240, Rotation::R90, 7, vec![128; 320 * 240]).with_crop(crop);
    let out = p.process_frame(&frame).unwrap();
    assert_eq!(out.text.as_deref(), Some("hello"));
    assert_eq!(out.stage, ScanStage::Base);
    assert_eq!(out.bbox, Some(RoiRect::new(0, 20, 100, 120)));
    assert_eq!((out.frame_width, out.frame_height), (320, 240));
    assert_eq!(out.rotation, Rotation::R90);
    assert_eq!(out.crop, Some(crop));
    assert_eq!(p.stats().decodes, 1);
    assert_eq!(p.stats().base_attempts, 1);
}

#[test]
fn test_decoder_errors_are_absorbed() {
    let decoder = |_: &DecodeRequest<'_>| -> DecodeResult { Err(DecodeError::Internal("boom".into())) };
    let mut p = ScanPipeline::with_defaults(decoder);
    for i in 0..5 {
        let out = p.process_frame(&blank(320, 240, i * 40)).unwrap();
        assert!(out.text.is_none());
        assert_eq!(out.stage, ScanStage::Searching);
    }
}

#[test]
fn test_diagnostic_never_becomes_text() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let decoder = move |_: &DecodeRequest<'_>| -> DecodeResult {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Some(PrimitiveHit::decoded("INVALID(Checksum)", RoiRect::new(10, 10, 90, 90), None)))
        } else {
            Ok(None)
        }
    };
    let mut p = ScanPipeline::with_defaults(decoder);
    let out = p.process_frame(&blank(320, 240, 0)).unwrap();
    assert!(out.text.is_none());
    assert_eq!(out.diagnostic.as_deref(), Some("INVALID(Checksum)"));
    assert_eq!(out.bbox, Some(RoiRect::new(10, 10, 90, 90)));

    // Remembered while the box is recent, forgotten afterwards.
    let out = p.process_frame(&blank(320, 240, 500)).unwrap();
    assert_eq!(out.diagnostic.as_deref(), Some("INVALID(Checksum)"));
    assert!(out.bbox.is_none());
    let out = p.process_frame(&blank(320, 240, 2_000)).unwrap();
    assert!(out.diagnostic.is_none());
}

#[test]
fn test_boosted_pass_is_cooldown_gated() {
    let mut p = ScanPipeline::with_defaults(box_only);
    // Frame 0 explores, later frames are hot thanks to the box.
    let mut ran = Vec::new();
    for t in [0, 60, 120, 180, 240] {
        let before = p.stats().boosted_attempts;
        p.process_frame(&blank(640, 480, t)).unwrap();
        ran.push(p.stats().boosted_attempts > before);
    }
    assert_eq!(ran, vec![true, false, false, true, false]);
}

#[test]
fn test_link_failure_disables_assisted_for_the_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let assist = ScriptedAssist {
        calls: calls.clone(),
        reply: || Err(AssistError::LinkFailure),
    };
    let mut p = ScanPipeline::with_defaults(box_only).with_assisted(assist);
    assert!(p.assisted_available());
    for i in 0..30 {
        let out = p.process_frame(&blank(640, 480, i * 100)).unwrap();
        assert!(out.text.is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!p.assisted_available());

    p.reset();
    assert!(!p.assisted_available());
    p.process_frame(&blank(640, 480, 10_000)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transient_assist_errors_keep_trying() {
    let calls = Arc::new(AtomicUsize::new(0));
    let assist = ScriptedAssist {
        calls: calls.clone(),
        reply: || Err(AssistError::Transient("busy".into())),
    };
    let mut p = ScanPipeline::with_defaults(box_only).with_assisted(assist);
    for i in 0..20 {
        p.process_frame(&blank(640, 480, i * 100)).unwrap();
    }
    assert!(calls.load(Ordering::SeqCst) > 1);
    assert!(p.assisted_available());
}

#[test]
fn test_assisted_text_decodes_during_warmup() {
    let assist = ScriptedAssist {
        calls: Arc::new(AtomicUsize::new(0)),
        reply: || {
            Ok(Some(AssistHit {
                quad: square_quad(64.0, 448.0),
                text: Some("assisted".into()),
            }))
        },
    };
    let mut p = ScanPipeline::with_defaults(nothing).with_assisted(assist);
    let out = p.process_frame(&blank(640, 480, 0)).unwrap();
    assert_eq!(out.text.as_deref(), Some("assisted"));
    assert_eq!(out.stage, ScanStage::Warmup);
    // Full-frame patch scaled 640x480 -> 512x512.
    assert_eq!(out.bbox, Some(RoiRect::new(80, 60, 560, 420)));
    assert_eq!(p.stats().assisted_calls, 1);
}

#[test]
fn test_warmup_caches_crops_and_rectifications() {
    let assist = ScriptedAssist {
        calls: Arc::new(AtomicUsize::new(0)),
        reply: || {
            Ok(Some(AssistHit {
                quad: square_quad(128.0, 384.0),
                text: None,
            }))
        },
    };
    let mut p = ScanPipeline::with_defaults(box_only).with_assisted(assist);
    p.process_frame(&blank(640, 480, 0)).unwrap();
    // One sharpest ROI crop plus one rectified patch.
    assert_eq!(p.cache().len(), 2);
    assert_eq!(p.cache().top_k_rectified(4).len(), 1);
    p.reset();
    assert!(p.cache().is_empty());
}

#[test]
fn test_heavy_run_follows_warmup() {
    let assist = ScriptedAssist {
        calls: Arc::new(AtomicUsize::new(0)),
        reply: || {
            Ok(Some(AssistHit {
                quad: square_quad(128.0, 384.0),
                text: None,
            }))
        },
    };
    let mut p = ScanPipeline::with_defaults(box_only).with_assisted(assist);
    // Warmup collects at 0 and 300, the heavy run happens at 600.
    for t in (0..=600).step_by(100) {
        p.process_frame(&blank(640, 480, t)).unwrap();
    }
    let stats = p.stats();
    assert_eq!(stats.assisted_calls, 2);
    assert_eq!(stats.fusions, 1);
    assert!(stats.enhancement_attempts > 0);
}

#[test]
fn test_status_sink_suppresses_quick_repeats() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = lines.clone();
    let mut p = ScanPipeline::with_defaults(box_only);
    p.set_status_sink(move |s: &str| sink_lines.lock().unwrap().push(s.to_string()));
    for t in (0..=400).step_by(100) {
        p.process_frame(&blank(640, 480, t)).unwrap();
    }
    let lines = lines.lock().unwrap();
    assert_eq!(*lines, vec!["explore:searching", "hot:searching", "hot:searching"]);
}

#[test]
fn test_hard_effort_forces_following_frames() {
    let mut p = ScanPipeline::with_defaults(nothing);
    p.process_frame(&blank(320, 240, 0)).unwrap();
    p.request_hard_effort(3);
    let forced: Vec<bool> = (1..=4)
        .map(|i| p.process_frame(&blank(320, 240, i * 33)).unwrap().tiers.forced)
        .collect();
    assert_eq!(forced, vec![true, true, true, false]);
}

#[test]
fn test_enhanced_attempts_run_base_over_all_patches_first() {
    let efforts = Arc::new(Mutex::new(Vec::new()));
    let seen = efforts.clone();
    let decoder = move |req: &DecodeRequest<'_>| -> DecodeResult {
        seen.lock().unwrap().push(req.effort);
        Ok(None)
    };
    let mut p = ScanPipeline::with_defaults(decoder);
    let patches: Vec<(GrayImage, PatchSource)> = [(0, 96), (300, 396)]
        .into_iter()
        .map(|(a, b)| {
            let img = GrayImage::from_fn(PATCH_SIDE, PATCH_SIDE, |x, y| {
                let dark = (128..384).contains(&x) && (128..384).contains(&y) && (x / 16 + y / 16) % 2 == 0;
                image::Luma([if dark { 30 } else { 220 }])
            });
            (img, PatchSource::Crop(RoiRect::new(a, a, b, b)))
        })
        .collect();

    let mut best = FrameBest::default();
    assert!(p.enhanced_attempts(&patches, ScanStage::Enhanced, 0, &mut best).is_none());

    let efforts = efforts.lock().unwrap();
    let half = efforts.len() / 2;
    assert!(half >= 12, "{} attempts", efforts.len());
    assert_eq!(efforts.len(), 2 * half);
    assert!(efforts[..half].iter().all(|&e| e == Effort::Base));
    assert!(efforts[half..].iter().all(|&e| e == Effort::Boosted));
    assert_eq!(p.stats().enhancement_attempts as usize, efforts.len());
}

#[test]
fn test_second_patch_base_rendering_beats_boosted_retry() {
    let efforts = Arc::new(Mutex::new(Vec::new()));
    let seen = efforts.clone();
    let decoder = move |req: &DecodeRequest<'_>| -> DecodeResult {
        seen.lock().unwrap().push(req.effort);
        // Only the second patch carries a black top-left corner.
        if req.effort == Effort::Base && req.pixels[0] == 0 {
            return Ok(Some(PrimitiveHit::decoded("second", RoiRect::new(0, 0, 512, 512), None)));
        }
        Ok(None)
    };
    let mut p = ScanPipeline::with_defaults(decoder);
    let plain = GrayImage::from_pixel(PATCH_SIDE, PATCH_SIDE, image::Luma([220]));
    let mut marked = plain.clone();
    for y in 0..64 {
        for x in 0..64 {
            marked.put_pixel(x, y, image::Luma([0]));
        }
    }
    let patches = vec![
        (plain, PatchSource::Crop(RoiRect::new(0, 0, 100, 100))),
        (marked, PatchSource::Crop(RoiRect::new(200, 200, 300, 300))),
    ];
    let mut best = FrameBest::default();
    let d = p.enhanced_attempts(&patches, ScanStage::Enhanced, 0, &mut best).unwrap();
    assert_eq!(d.text, "second");
    assert_eq!(d.stage, ScanStage::Enhanced);
    let efforts = efforts.lock().unwrap();
    assert!(efforts.len() > 1);
    assert!(efforts.iter().all(|&e| e == Effort::Base));
}
