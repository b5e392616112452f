use seal_crypto::{
    derive_stream_key, digest_bytes, generate_stream_key, sign_digest, unwrap_key, wrap_key,
    ChunkCipher, KdfParams, KeyPair,
};
use secrecy::SecretString;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_chunk(bencher: divan::Bencher, size: usize) {
    let cipher = ChunkCipher::new(generate_stream_key());
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| cipher.encrypt(0, divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_chunk(bencher: divan::Bencher, size: usize) {
    let cipher = ChunkCipher::new(generate_stream_key());
    let data = make_data(size);
    let record = cipher.encrypt(0, &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| cipher.decrypt(0, divan::black_box(&record)).unwrap());
}

#[divan::bench(sample_count = 10)]
fn bench_derive_stream_key() -> seal_crypto::StreamKey {
    let password = SecretString::from("correct horse battery staple");
    derive_stream_key(&password, &[7u8; 16], &KdfParams::PROTOCOL).unwrap()
}

#[divan::bench]
fn bench_wrap_unwrap(bencher: divan::Bencher) {
    let recipient = KeyPair::generate();
    let key = generate_stream_key();
    bencher.bench(|| {
        let wrapped = wrap_key(recipient.public(), divan::black_box(&key)).unwrap();
        unwrap_key(recipient.secret(), &wrapped).unwrap()
    });
}

#[divan::bench]
fn bench_sign_digest(bencher: divan::Bencher) {
    let sender = KeyPair::generate();
    let digest = digest_bytes(&make_data(4096));
    bencher.bench(|| sign_digest(sender.secret(), divan::black_box(&digest)).unwrap());
}

fn main() {
    divan::main();
}
