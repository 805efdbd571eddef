fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cumulus_protocol::{
        CdnUrl, ChunkAck, PrepareUserUploadRequest, PrepareUserUploadResponse, RequestPacket,
        ResponsePacket, ServerResponse, ServiceName, ServiceOperation, UserFileList, reason,
        status,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Parses a fixture into `T`, re-serializes it, and compares the JSON
    /// values (key order independent).
    ///
    /// Parsing goes through the text form because response payloads are
    /// held as raw JSON.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let text = load_fixture(name);
        let fixture: serde_json::Value = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("fixture {name} is not JSON: {e}"));
        let parsed: T = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_string(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        let reserialized: serde_json::Value = serde_json::from_str(&reserialized).unwrap();

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  ours: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_request_packet() {
        let packet: RequestPacket = roundtrip_test("request_packet.json");
        assert_eq!(packet.messages.len(), 1);
        let call = &packet.messages[0];
        assert_eq!(call.service, ServiceName::File);
        assert_eq!(call.operation, ServiceOperation::PrepareUserUpload);
        assert_eq!(call.operation.service(), call.service);

        let payload: PrepareUserUploadRequest =
            serde_json::from_value(call.data.clone()).unwrap();
        assert_eq!(payload.file_size, 4096);
        assert!(payload.replace_if_exists);
    }

    #[test]
    fn fixture_response_packet() {
        let packet: ResponsePacket = roundtrip_test("response_packet.json");
        let response = &packet.responses[0];
        assert!(response.is_ok());

        let prepared = response
            .parse_data::<PrepareUserUploadResponse>()
            .unwrap()
            .unwrap();
        assert_eq!(
            prepared.file_details.upload_id.as_deref(),
            Some("a1f2b7c0-52cb-4a4f-b7ab-2c7c3c0b9f51")
        );
        assert_eq!(prepared.file_details.file_size, 4096);
    }

    #[test]
    fn fixture_error_response() {
        let response: ServerResponse = roundtrip_test("error_response.json");
        assert_eq!(response.status, status::CLIENT_NETWORK_ERROR);
        assert_eq!(response.reason(), reason::CLIENT_UPLOAD_FILE_CANCELLED);

        // The failure callback body is built the same way.
        let built = ServerResponse::error(900, 90100, "upload cancelled").to_json();
        let built: serde_json::Value = serde_json::from_str(&built).unwrap();
        let fixture: serde_json::Value =
            serde_json::from_str(&load_fixture("error_response.json")).unwrap();
        assert_eq!(built, fixture);
    }

    #[test]
    fn fixture_prepare_user_upload_request() {
        let request: PrepareUserUploadRequest =
            roundtrip_test("prepare_user_upload_request.json");
        assert!(request.local_path.is_empty());
        assert_eq!(request.cloud_path, "");
    }

    #[test]
    fn fixture_user_file_list() {
        let list: UserFileList = roundtrip_test("user_file_list.json");
        assert_eq!(list.file_list.len(), 2);
        assert!(list.file_list[1].url.is_some());
        assert!(list.file_list[0].upload_id.is_none());
    }

    #[test]
    fn fixture_chunk_ack() {
        let ack: ChunkAck = roundtrip_test("chunk_ack.json");
        assert_eq!(ack.ack_offset, 1024 * 1024);
    }

    #[test]
    fn fixture_cdn_url() {
        let url: CdnUrl = roundtrip_test("cdn_url.json");
        assert!(url.cdn_url.starts_with("https://cdn."));
    }

    #[test]
    fn operation_wire_keys() {
        for (op, key) in [
            (ServiceOperation::Authenticate, "AUTHENTICATE"),
            (ServiceOperation::PrepareUserUpload, "PREPARE_USER_UPLOAD"),
            (ServiceOperation::ListUserFiles, "LIST_USER_FILES"),
            (ServiceOperation::DeleteUserFile, "DELETE_USER_FILE"),
            (ServiceOperation::DeleteUserFiles, "DELETE_USER_FILES"),
            (ServiceOperation::GetCdnUrl, "GET_CDN_URL"),
        ] {
            assert_eq!(op.as_str(), key);
            assert_eq!(serde_json::to_value(op).unwrap(), serde_json::json!(key));
        }
    }
}
