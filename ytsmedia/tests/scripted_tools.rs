//! Runs the yt-dlp and ffmpeg adapters against small shell scripts standing
//! in for the real tools.
#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use ytsmedia::{
    ConvertRequest, FfmpegTranscoder, Fetcher, MediaError, ProgressFn, Transcoder, YtDlpFetcher,
};

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |p: f64| sink.lock().unwrap().push(p));
    (progress, seen)
}

#[tokio::test]
async fn test_metadata_from_dump_json() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(
        dir.path(),
        "yt-dlp",
        r#"echo '{"title": "Song A", "uploader": "Artist A", "duration": 3.5, "webpage_url": "https://www.youtube.com/watch?v=aaaaaaaaaaa"}'"#,
    );

    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path().join("work"));
    let meta = fetcher
        .fetch_metadata(
            "https://www.youtube.com/watch?v=aaaaaaaaaaa",
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(meta.title, "Song A");
    assert_eq!(meta.artist.as_deref(), Some("Artist A"));
    assert_eq!(meta.duration, Some(Duration::from_millis(3500)));
}

#[tokio::test]
async fn test_metadata_failure_carries_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(dir.path(), "yt-dlp", "echo 'ERROR: Video unavailable' >&2; exit 1");

    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path());
    match fetcher
        .fetch_metadata("https://example.com/x", CancellationToken::new())
        .await
    {
        Err(MediaError::MetadataFetchFailed(detail)) => {
            assert!(detail.contains("Video unavailable"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_collection_lines() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(
        dir.path(),
        "yt-dlp",
        r#"echo '{"id": "aaaaaaaaaaa", "title": "One"}'
echo '{"id": "bbbbbbbbbbb", "title": "Two"}'"#,
    );

    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path());
    let entries = fetcher
        .fetch_collection_metadata(
            "https://www.youtube.com/playlist?list=PL1",
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["One", "Two"]);
}

#[tokio::test]
async fn test_collection_fetch_cancellation_kills_tool() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(dir.path(), "yt-dlp", "sleep 30");
    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        fetcher.fetch_collection_metadata("https://www.youtube.com/playlist?list=PL1", cancel),
    )
    .await
    .expect("cancelled fetch should return promptly");
    assert!(matches!(result, Err(MediaError::Cancelled)));
}

#[tokio::test]
async fn test_metadata_fetch_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(dir.path(), "yt-dlp", "sleep 30");
    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = fetcher.fetch_metadata("https://example.com/x", cancel).await;
    assert!(matches!(result, Err(MediaError::Cancelled)));
}

#[tokio::test]
async fn test_download_reports_progress_and_finds_file() {
    let dir = tempfile::tempdir().unwrap();
    // the output template is the argument following -o
    let tool = script(
        dir.path(),
        "yt-dlp",
        r#"while [ "$1" != "-o" ]; do shift; done
out=$(echo "$2" | sed 's/%(ext)s/webm/')
echo '[download]  10.0% of 1.00MiB'
echo '[download]  55.5% of 1.00MiB'
echo '[download] 100% of 1.00MiB'
printf 'audio' > "$out""#,
    );

    let work = dir.path().join("work");
    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), &work);
    let (progress, seen) = recorder();
    let path = fetcher
        .download("https://example.com/x", progress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(path.extension().unwrap(), "webm");
    assert!(path.starts_with(&work));
    assert_eq!(std::fs::read(&path).unwrap(), b"audio");
    assert_eq!(*seen.lock().unwrap(), vec![10.0, 55.5, 100.0]);
}

#[tokio::test]
async fn test_download_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(dir.path(), "yt-dlp", "sleep 30");
    let fetcher = YtDlpFetcher::new(tool.to_string_lossy(), dir.path().join("work"));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let (progress, _) = recorder();
    let result = fetcher.download("https://example.com/x", progress, cancel).await;
    assert!(matches!(result, Err(MediaError::Cancelled)));
}

#[tokio::test]
async fn test_convert_removes_input_and_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    // the output path is the last argument
    let tool = script(
        dir.path(),
        "ffmpeg",
        r#"for last; do :; done
echo 'out_time=00:00:01.000000'
echo 'out_time=00:00:02.000000'
printf 'ID3mp3' > "$last""#,
    );

    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let input = work.join("audio_1.webm");
    std::fs::write(&input, b"raw").unwrap();

    let transcoder = FfmpegTranscoder::new(tool.to_string_lossy(), &work);
    let (progress, seen) = recorder();
    let output = transcoder
        .convert(
            ConvertRequest {
                input: input.clone(),
                title: Some("Song A".into()),
                duration: Some(Duration::from_secs(4)),
                ..Default::default()
            },
            progress,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.extension().unwrap(), "mp3");
    assert_eq!(std::fs::read(&output).unwrap(), b"ID3mp3");
    assert!(!input.exists());
    assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0]);
}

#[tokio::test]
async fn test_convert_failure_keeps_input() {
    let dir = tempfile::tempdir().unwrap();
    let tool = script(dir.path(), "ffmpeg", "echo 'Invalid data found' >&2; exit 1");

    let input = dir.path().join("in.webm");
    std::fs::write(&input, b"raw").unwrap();

    let transcoder = FfmpegTranscoder::new(tool.to_string_lossy(), dir.path());
    let (progress, _) = recorder();
    let result = transcoder
        .convert(
            ConvertRequest {
                input: input.clone(),
                ..Default::default()
            },
            progress,
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(MediaError::ConversionFailed(_))));
    assert!(input.exists());
}
