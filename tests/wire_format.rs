//! Serialized client/server exchange
//!
//! The server only ever sees blobs: parameters, evaluation keys, queries.

use hepir::bfv::Ciphertext;
use hepir::math::Poly;
use hepir::engine::{
    respond_matching_bytes, respond_retrieval_bytes, Database, ProtocolParams,
};
use hepir::params::BfvParams;
use hepir::{wire, Client, SchemeAdapter};

#[test]
fn test_retrieval_over_blobs() {
    let params = BfvParams::insecure_test();
    let protocol = ProtocolParams::retrieval(vec![4, 2]);
    let mut client = Client::for_retrieval(params.clone(), &protocol.dimensions, Some(21)).unwrap();

    let params_blob = wire::to_bytes(&params).unwrap();
    let keys_blob = wire::to_bytes(client.evaluation_keys()).unwrap();
    let protocol_json = wire::to_json(&protocol).unwrap();

    // Server side: rebuilt purely from blobs
    let server = wire::evaluator_from_bytes(&params_blob, &keys_blob).unwrap();
    let protocol_server: ProtocolParams = wire::from_json(&protocol_json).unwrap();
    assert_eq!(protocol_server, protocol);
    let db = Database::new(
        (0..8u64)
            .map(|i| server.plaintext_from_coeffs(vec![i * 3, 1]))
            .collect(),
    );

    let queries = client
        .retrieval_query(&protocol.dimensions, &[2, 1], protocol.reduce.expansion)
        .unwrap();
    let query_blob = wire::to_bytes(&queries).unwrap();
    let reply_blob = respond_retrieval_bytes(&server, &protocol_server, &db, &query_blob).unwrap();

    let reply: Vec<Ciphertext> = wire::from_bytes(&reply_blob).unwrap();
    let entry = client
        .decode_retrieval(reply, &protocol.dimensions, &protocol.reduce)
        .unwrap();
    assert_eq!(&entry[..2], &[15, 1]);
}

#[test]
fn test_matching_over_blobs() {
    let params = BfvParams::insecure_test();
    let protocol = ProtocolParams::matching(4, vec![1, 3], 1).unwrap();
    let mut client = Client::new(params.clone(), &[], Some(22)).unwrap();
    let server = wire::evaluator_from_bytes(
        &wire::to_bytes(&params).unwrap(),
        &wire::to_bytes(client.evaluation_keys()).unwrap(),
    )
    .unwrap();

    // P(x) = x^4 + 1
    let coeffs: Vec<_> = [1u64, 0, 0, 0, 1]
        .iter()
        .map(|&c| server.encode_constant(c))
        .collect();
    let sources = client.matching_query(3, &protocol.source_powers).unwrap();
    let blob = respond_matching_bytes(&server, &protocol, &coeffs, &wire::to_bytes(&sources).unwrap()).unwrap();
    let reply: Ciphertext = wire::from_bytes(&blob).unwrap();
    assert_eq!(client.decode_matching(&reply)[0], 82);
}

#[test]
fn test_corrupt_blobs_are_errors() {
    let params = BfvParams::insecure_test();
    let protocol = ProtocolParams::retrieval(vec![2]);
    let client = Client::for_retrieval(params.clone(), &protocol.dimensions, Some(23)).unwrap();
    let server = client.server_evaluator();
    let db = Database::new(vec![server.encode_constant(1); 2]);

    assert!(respond_retrieval_bytes(&server, &protocol, &db, &[0xff, 0x01]).is_err());
    assert!(wire::evaluator_from_bytes(&[1, 2, 3], &[]).is_err());

    let keys_blob = wire::to_bytes(client.evaluation_keys()).unwrap();
    let mut bad_params = params;
    bad_params.ring_dim = 48;
    let bad_params_blob = wire::to_bytes(&bad_params).unwrap();
    assert!(wire::evaluator_from_bytes(&bad_params_blob, &keys_blob).is_err());
}

#[test]
fn test_foreign_ciphertexts_are_rejected() {
    let params = BfvParams::insecure_test();
    let protocol = ProtocolParams::retrieval(vec![2]);
    let client = Client::for_retrieval(params.clone(), &protocol.dimensions, Some(24)).unwrap();
    let server = client.server_evaluator();
    let db = Database::new(vec![server.encode_constant(1); 2]);

    // A query without polynomials does not decode
    let empty = wire::to_bytes(&vec![Vec::<Poly>::new()]).unwrap();
    let err = respond_retrieval_bytes(&server, &protocol, &db, &empty).unwrap_err();
    assert!(matches!(err, hepir::Error::Serialization(_)));

    // Well-formed, but over a smaller ring
    let small = Poly::zero(32, &params.moduli);
    let foreign = vec![Ciphertext::from_polys(vec![small.clone(), small])];
    let blob = wire::to_bytes(&foreign).unwrap();
    let err = respond_retrieval_bytes(&server, &protocol, &db, &blob).unwrap_err();
    assert!(matches!(err, hepir::Error::Configuration(_)));

    // Right ring, but moduli outside the chain
    let stranger = Poly::zero(64, &[params.moduli[1]]);
    let foreign = vec![(1usize, Ciphertext::from_polys(vec![stranger.clone(), stranger]))];
    let matching = ProtocolParams::matching(2, vec![1], 0).unwrap();
    let coeffs = vec![server.encode_constant(1); 3];
    let blob = wire::to_bytes(&foreign).unwrap();
    let err = respond_matching_bytes(&server, &matching, &coeffs, &blob).unwrap_err();
    assert!(matches!(err, hepir::Error::Configuration(_)));
}
