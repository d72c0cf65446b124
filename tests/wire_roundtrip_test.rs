//! Codec round-trip tests for both request shapes.

use tensor_vault::wire::{
    decode_request, encode_request, InferRequest, RegisterRequest, Request, WireTensor,
};

#[test]
fn register_roundtrip() {
    let request = Request::Register(RegisterRequest {
        id: -1,
        partition_names: vec!["resnet_p0".to_string(), "resnet_p1".to_string()],
        partitions: vec![vec![1, 2, 3], vec![4, 5, 6, 7]],
        inputs: vec![WireTensor::new(&[1, 3], &[0.5, -0.5, 2.0])],
        tokenizer: None,
    });

    let encoded = encode_request(&request).unwrap();
    let decoded = decode_request(&encoded).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn register_roundtrip_with_tokenizer_and_no_inputs() {
    let request = Request::Register(RegisterRequest {
        id: -1,
        partition_names: vec!["lm".to_string()],
        partitions: vec![vec![0xAB; 64]],
        inputs: Vec::new(),
        tokenizer: Some(b"vocabulary".to_vec()),
    });

    let encoded = encode_request(&request).unwrap();
    assert_eq!(decode_request(&encoded).unwrap(), request);
}

#[test]
fn infer_roundtrip_with_tags() {
    let request = Request::Infer(InferRequest {
        model_id: 3,
        inputs: vec![
            WireTensor::new(&[2, 2], &[1.0, 2.0, 3.0, 4.0]),
            WireTensor::new(&[1], &[9.0]),
        ],
        tags: vec!["00112233445566778899aabbccddeeff".to_string(); 2],
        tokenizer: None,
    });

    let encoded = encode_request(&request).unwrap();
    assert_eq!(decode_request(&encoded).unwrap(), request);
}

#[test]
fn infer_roundtrip_with_empty_lists() {
    let request = Request::Infer(InferRequest {
        model_id: 0,
        inputs: Vec::new(),
        tags: Vec::new(),
        tokenizer: None,
    });

    let encoded = encode_request(&request).unwrap();
    assert_eq!(decode_request(&encoded).unwrap(), request);
}

#[test]
fn shutdown_roundtrip() {
    let encoded = encode_request(&Request::Shutdown).unwrap();
    assert_eq!(decode_request(&encoded).unwrap(), Request::Shutdown);
}

#[test]
fn truncated_payload_is_malformed_not_a_panic() {
    let request = Request::Register(RegisterRequest {
        id: -1,
        partition_names: vec!["p".to_string()],
        partitions: vec![vec![1, 2, 3, 4]],
        inputs: Vec::new(),
        tokenizer: None,
    });
    let encoded = encode_request(&request).unwrap();

    for cut in 1..encoded.len() {
        assert!(
            decode_request(&encoded[..cut]).is_err(),
            "prefix of {cut} bytes decoded successfully"
        );
    }
}
