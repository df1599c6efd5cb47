use criterion::{criterion_group, criterion_main, Criterion};
use std::cell::RefCell;
use std::rc::Rc;
use strix_html5::errors::ErrorLogger;
use strix_html5::tokenizer::Tokenizer;
use strix_shared::byte_stream::InputStream;

fn build_document() -> String {
    let mut html =
        String::from("<!DOCTYPE html><html><head><title>bench &amp; markers</title></head><body>");
    for i in 0..250 {
        html.push_str(&format!(
            "<div id=row{i} class=\"row\"><p>cell &#x2603; {i}</p><!-- row {i} --></div>"
        ));
    }
    html.push_str("</body></html>");
    html
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tokenization");
    group.significance_level(0.1).sample_size(500);

    let document = build_document();

    group.bench_function("document", |b| {
        b.iter(|| {
            let mut stream = InputStream::from_str(&document);
            let error_logger = Rc::new(RefCell::new(ErrorLogger::new()));
            let mut tokenizer = Tokenizer::new(&mut stream, None, error_logger);

            loop {
                if tokenizer.next_token().unwrap().is_eof() {
                    break;
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
