use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use readgloss_rs::annotate::Annotator;
use readgloss_rs::markup::tokenize;
use readgloss_rs::vocab::{Vocabulary, VocabularyEntry};

const WORDS: &[&str] = &[
    "Vater", "Mutter", "Großvater", "Kontor", "Haus", "Tür", "Fenster", "Garten", "Brief",
    "Kaufmann", "Geschäft", "Familie", "Schwester", "Bruder", "Zeit", "Sonntag",
];

fn synthetic_chapter(paragraphs: usize) -> String {
    let sentence = "Der Großvater saß im Kontor, während die Mutter im Garten einen Brief \
                    las und der Kaufmann über das Geschäft der Familie sprach.";
    (0..paragraphs)
        .map(|_| format!("{sentence} {sentence}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn vocabulary(size: usize) -> Vocabulary {
    let entries = WORDS
        .iter()
        .cycle()
        .take(size)
        .enumerate()
        .map(|(i, word)| {
            // Pad beyond the fixed list with words that never occur.
            let word = if i < WORDS.len() {
                word.to_string()
            } else {
                format!("{word}wort{i}")
            };
            VocabularyEntry::new(word, "de", "en", 1)
        });
    Vocabulary::new(1, entries)
}

fn bench_tokenize(c: &mut Criterion) {
    let text = synthetic_chapter(200);
    c.bench_function("tokenize::chapter_200_paragraphs", |b| {
        b.iter(|| black_box(tokenize(black_box(&text)).len()));
    });
}

fn bench_annotate(c: &mut Criterion) {
    let text = synthetic_chapter(200);
    for &size in &[16usize, 128, 512] {
        let annotator = Annotator::from_vocabulary(&vocabulary(size));
        c.bench_with_input(BenchmarkId::new("annotate", size), &text, |b, text| {
            b.iter(|| {
                let annotated = annotator.annotate(text).expect("non-empty chapter");
                black_box(annotated.marker_count);
            });
        });
    }
}

fn bench_compile(c: &mut Criterion) {
    let vocab = vocabulary(512);
    c.bench_function("compile::512_patterns", |b| {
        b.iter(|| black_box(Annotator::from_vocabulary(&vocab).patterns().len()));
    });
}

criterion_group!(benches, bench_tokenize, bench_annotate, bench_compile);
criterion_main!(benches);
