use std::{
    io::{BufRead, BufReader, Write},
    net::TcpListener,
    path::Path,
    time::Duration,
};

use super::*;

fn serve_once(status: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
            line.clear();
        }
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
    });
    format!("http://{addr}/clip.mp4")
}

fn ingest(media: &Path, decoder: PathBuf, keep_sources: bool) -> Ingest {
    Ingest::new(
        MediaFetcher::new(media, Some(Duration::from_secs(10))).unwrap(),
        FrameExtractor::new(decoder, media),
        keep_sources,
    )
}

fn collect_stages(
    ingest: &Ingest,
    request: &MediaRequest,
) -> (TilecastResult<PreparedMedia>, Vec<Stage>) {
    let mut stages = Vec::new();
    let res = ingest.prepare(request, &mut |s| stages.push(s));
    (res, stages)
}

#[test]
fn fetch_failure_stops_before_extracting() {
    let media = tempfile::tempdir().unwrap();
    let url = serve_once("500 Internal Server Error", b"boom");
    let ing = ingest(media.path(), PathBuf::from("unused"), true);
    let req = MediaRequest::new("clip", &url, 1, 1, None).unwrap();

    let (res, stages) = collect_stages(&ing, &req);
    assert!(matches!(res, Err(TilecastError::Fetch(_))));
    assert_eq!(stages, vec![Stage::Downloading]);
}

#[test]
fn summary_mentions_counts() {
    let prepared = PreparedMedia {
        request: MediaRequest::new("wave", "https://x.test/w.gif", 3, 2, Some(10)).unwrap(),
        source_path: None,
        frames: FrameSequence::new(vec![image::RgbaImage::new(384, 256); 4]).unwrap(),
    };
    assert_eq!(
        prepared.summary(),
        "wave: 4 frames at 384x256 px, 10 fps, 3x2 grid"
    );
}

#[cfg(unix)]
mod with_fake_decoder {
    use std::os::unix::fs::PermissionsExt as _;

    use super::*;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ffmpeg.sh");
        let text = format!(
            "#!/bin/sh\nfor a in \"$@\"; do out=\"$a\"; done\noutdir=$(dirname \"$out\")\n{body}\n"
        );
        std::fs::write(&path, text).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Decoder that emits `n` copies of a 128x128 fixture.
    fn decoder_emitting(tools: &Path, n: usize) -> PathBuf {
        let fixture = tools.join("tile.png");
        image::RgbaImage::from_pixel(128, 128, image::Rgba([200, 0, 0, 255]))
            .save(&fixture)
            .unwrap();
        let body: String = (1..=n)
            .map(|i| format!("cp {} \"$outdir/frame_{i:05}.png\"\n", fixture.display()))
            .collect();
        script(tools, &body)
    }

    #[test]
    fn prepares_frames_and_reports_stages() {
        let tools = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let ing = ingest(media.path(), decoder_emitting(tools.path(), 3), true);
        let req = MediaRequest::new("clip", &serve_once("200 OK", b"data"), 1, 1, None).unwrap();

        let (res, stages) = collect_stages(&ing, &req);
        let prepared = res.unwrap();
        assert_eq!(prepared.frames.len(), 3);
        assert_eq!(
            stages,
            vec![Stage::Downloading, Stage::Extracting, Stage::Ready { frames: 3 }]
        );
        let src = prepared.source_path.unwrap();
        assert_eq!(std::fs::read(src).unwrap(), b"data");
    }

    #[test]
    fn source_is_removed_when_not_kept() {
        let tools = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let ing = ingest(media.path(), decoder_emitting(tools.path(), 1), false);
        let req = MediaRequest::new("clip", &serve_once("200 OK", b"data"), 1, 1, None).unwrap();

        let prepared = ing.prepare(&req, &mut |_| {}).unwrap();
        assert!(prepared.source_path.is_none());
        assert_eq!(std::fs::read_dir(media.path()).unwrap().count(), 0);
    }

    #[test]
    fn zero_frames_is_empty_result() {
        let tools = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let ing = ingest(media.path(), script(tools.path(), "exit 0"), true);
        let req = MediaRequest::new("clip", &serve_once("200 OK", b"data"), 1, 1, None).unwrap();

        let (res, stages) = collect_stages(&ing, &req);
        let err = res.unwrap_err();
        assert!(matches!(err, TilecastError::EmptyResult));
        assert_eq!(err.user_message(), "Failed to extract frames from video!");
        assert_eq!(stages, vec![Stage::Downloading, Stage::Extracting]);
    }

    #[test]
    fn spawned_prepare_delivers_one_result() {
        let tools = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let ing = Arc::new(ingest(media.path(), decoder_emitting(tools.path(), 2), true));
        let req = MediaRequest::new("clip", &serve_once("200 OK", b"data"), 1, 1, None).unwrap();

        let rx = Arc::clone(&ing).spawn_prepare(req).unwrap();
        let prepared = rx.recv_timeout(Duration::from_secs(30)).unwrap().unwrap();
        assert_eq!(prepared.frames.len(), 2);
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
    }
}
