use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use swell_bencher::TestCase;
use swell_http::codec::MessageDecoder;
use swell_http::protocol::Kind;
use tokio_util::codec::Decoder;

static CASES: &[TestCase] = &[
    TestCase::new(
        "small_header",
        "GET /index.html HTTP/1.1\r\n\
         Host: 127.0.0.1:8080\r\n\
         User-Agent: curl/7.79.1\r\n\
         Accept: */*\r\n\
         \r\n",
    ),
    TestCase::new(
        "large_header",
        "GET /index/?a=1&b=2&a=3 HTTP/1.1\r\n\
         Host: 127.0.0.1:8080\r\n\
         Connection: keep-alive\r\n\
         Cache-Control: max-age=0\r\n\
         Upgrade-Insecure-Requests: 1\r\n\
         User-Agent: Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36\r\n\
         Accept: text/html, application/xhtml+xml, application/xml\r\n\
         Sec-Fetch-Site: none\r\n\
         Sec-Fetch-Mode: navigate\r\n\
         Sec-Fetch-User: ?1\r\n\
         Sec-Fetch-Dest: document\r\n\
         Accept-Encoding: gzip, deflate, br\r\n\
         Accept-Language: zh-CN, zh, en-US, en\r\n\
         \r\n",
    ),
    TestCase::new(
        "chunked_body",
        "POST /upload HTTP/1.1\r\n\
         Host: 127.0.0.1:8080\r\n\
         Transfer-Encoding: chunked\r\n\
         \r\n\
         10\r\n1234567890abcdef\r\n\
         10\r\n1234567890abcdef\r\n\
         0\r\n\r\n",
    ),
];

fn benchmark_message_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("message_decoder");

    for case in CASES {
        group.throughput(Throughput::Bytes(case.wire_len()));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), case, |b, case| {
            b.iter_batched_ref(
                || {
                    (
                        MessageDecoder::with_defaults(Kind::Request),
                        BytesMut::from(case.content()),
                    )
                },
                |(decoder, bytes_mut)| {
                    let message = decoder
                        .decode(bytes_mut)
                        .expect("input should be a valid http request")
                        .expect("input should contain a complete message");
                    black_box(message);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_message_decoder);
criterion_main!(decoder);
