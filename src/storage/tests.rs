use super::*;
use bytes::Bytes;
use tempfile::TempDir;

#[tokio::test]
async fn test_file_sink_preallocates() {
    let temp = TempDir::new().unwrap();
    let sink = FileSink::create(temp.path().join("nested/out.bin"), 65536)
        .await
        .unwrap();

    let meta = tokio::fs::metadata(sink.path()).await.unwrap();
    assert_eq!(meta.len(), 65536);
    assert_eq!(sink.len(), 65536);

    // unwritten ranges read back as zeros
    let zeros = sink.read_at(1000, 16).await.unwrap();
    assert_eq!(zeros.as_ref(), &[0u8; 16]);
}

#[tokio::test]
async fn test_file_sink_write_read() {
    let temp = TempDir::new().unwrap();
    let sink = FileSink::create(temp.path().join("out.bin"), 65536)
        .await
        .unwrap();

    sink.write_at(32768, Bytes::from(vec![7u8; 32768]))
        .await
        .unwrap();
    sink.write_at(0, Bytes::from(vec![3u8; 32768])).await.unwrap();
    sink.flush().await.unwrap();

    assert_eq!(sink.read_at(32760, 16).await.unwrap().as_ref(), &[
        3, 3, 3, 3, 3, 3, 3, 3, 7, 7, 7, 7, 7, 7, 7, 7
    ]);

    let on_disk = tokio::fs::read(sink.path()).await.unwrap();
    assert_eq!(on_disk.len(), 65536);
    assert!(on_disk[..32768].iter().all(|&b| b == 3));
    assert!(on_disk[32768..].iter().all(|&b| b == 7));
}

#[tokio::test]
async fn test_file_sink_out_of_bounds() {
    let temp = TempDir::new().unwrap();
    let sink = FileSink::create(temp.path().join("out.bin"), 100)
        .await
        .unwrap();

    assert!(matches!(
        sink.write_at(90, Bytes::from(vec![0u8; 20])).await,
        Err(StorageError::OutOfBounds { .. })
    ));
    assert!(matches!(
        sink.read_at(u64::MAX, 1).await,
        Err(StorageError::OutOfBounds { .. })
    ));
}

#[tokio::test]
async fn test_file_sink_keeps_existing_content() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("out.bin");
    {
        let sink = FileSink::create(&path, 10).await.unwrap();
        sink.write_at(0, Bytes::from_static(b"0123456789")).await.unwrap();
    }

    let sink = FileSink::create(&path, 10).await.unwrap();
    assert_eq!(sink.read_at(0, 10).await.unwrap().as_ref(), b"0123456789");
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let temp = TempDir::new().unwrap();

    assert!(matches!(
        FileSink::in_dir(temp.path(), "../escape.bin", 10).await,
        Err(StorageError::PathTraversal(_))
    ));
    assert!(matches!(
        FileSink::in_dir(temp.path(), "/etc/passwd", 10).await,
        Err(StorageError::PathTraversal(_))
    ));

    let sink = FileSink::in_dir(temp.path(), "ok/payload.bin", 10)
        .await
        .unwrap();
    assert!(sink.path().starts_with(temp.path()));
}

#[tokio::test]
async fn test_memory_sink_records_writes() {
    let sink = MemorySink::new();
    sink.write_at(32768, Bytes::from(vec![2u8; 4])).await.unwrap();
    sink.write_at(0, Bytes::from(vec![1u8; 4])).await.unwrap();

    assert_eq!(sink.writes(), vec![(32768, 4), (0, 4)]);
    assert_eq!(sink.contents().len(), 32772);
    assert_eq!(sink.read_at(0, 4).await.unwrap().as_ref(), &[1u8; 4]);
    assert!(sink.read_at(32770, 10).await.is_err());
}

#[tokio::test]
async fn test_sink_as_trait_object() {
    let sink: std::sync::Arc<dyn ByteSink> = std::sync::Arc::new(MemorySink::with_data(b"abcdef".to_vec()));
    assert_eq!(sink.read_at(2, 3).await.unwrap().as_ref(), b"cde");
}
