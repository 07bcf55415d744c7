use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const XMP_START: &[u8] = b"<x:xmpmeta";
const XMP_END: &[u8] = b"</x:xmpmeta>";
const READ_CHUNK: usize = 256 * 1024;
pub const MAX_PACKET_BYTES: usize = 4 * 1024 * 1024;

/// Finds the first embedded `<x:xmpmeta ... </x:xmpmeta>` packet in `path`.
pub fn find_xmp_packet(path: &Path) -> io::Result<Option<String>> {
    let file = File::open(path)?;
    scan_for_packet(file)
}

/// Single streaming pass. Before the start marker is seen only a marker-sized
/// tail is carried between chunks; after it, bytes accumulate until the end
/// marker or `MAX_PACKET_BYTES`.
pub(crate) fn scan_for_packet<R: Read>(mut reader: R) -> io::Result<Option<String>> {
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut window: Vec<u8> = Vec::new();
    let mut in_packet = false;
    // Bytes of `window` already searched for the end marker.
    let mut searched = 0usize;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        window.extend_from_slice(&chunk[..n]);

        if !in_packet {
            match find(&window, XMP_START) {
                Some(start) => {
                    window.drain(..start);
                    in_packet = true;
                    searched = 0;
                }
                None => {
                    let keep = XMP_START.len() - 1;
                    if window.len() > keep {
                        window.drain(..window.len() - keep);
                    }
                    continue;
                }
            }
        }

        let from = searched.saturating_sub(XMP_END.len() - 1);
        if let Some(pos) = find(&window[from..], XMP_END) {
            let end = from + pos + XMP_END.len();
            return Ok(Some(String::from_utf8_lossy(&window[..end]).into_owned()));
        }
        if window.len() > MAX_PACKET_BYTES {
            return Ok(None);
        }
        searched = window.len();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|candidate| candidate == needle)
}
