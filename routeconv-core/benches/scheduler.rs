use criterion::{Criterion, black_box, criterion_group, criterion_main};
use routeconv_core::{scheduler::Scheduler, time::SimTime};
use std::time::Duration;

const EVENTS: u64 = 1_000;

#[derive(Default)]
struct Counter(u64);

fn one_shot(c: &mut Criterion) {
    c.bench_function("schedule_and_run_1000", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::<Counter>::new();
            let mut counter = Counter::default();
            for millis in 0..EVENTS {
                scheduler.schedule(Duration::from_millis(millis), |counter: &mut Counter, _| {
                    counter.0 += 1;
                    Ok(())
                });
            }
            scheduler
                .run_until(&mut counter, SimTime::from_millis(EVENTS))
                .unwrap();
            black_box(counter.0)
        })
    });
}

fn repeating(c: &mut Criterion) {
    // 30 routers polled every 100ms over a 300s simulation
    c.bench_function("poll_30_routers_300s", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::<Counter>::new();
            let mut counter = Counter::default();
            for _ in 0..30 {
                scheduler
                    .schedule_repeating(
                        Duration::from_millis(100),
                        Duration::from_millis(100),
                        |counter: &mut Counter, _| {
                            counter.0 += 1;
                            Ok(())
                        },
                    )
                    .unwrap();
            }
            scheduler
                .run_until(&mut counter, black_box(SimTime::from_secs(300)))
                .unwrap();
            black_box(counter.0)
        })
    });
}

fn cancel(c: &mut Criterion) {
    c.bench_function("cancel_pending", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::<Counter>::new();
            let timers: Vec<_> = (0..EVENTS)
                .map(|millis| scheduler.schedule(Duration::from_millis(millis), |_, _| Ok(())))
                .collect();
            for timer in timers {
                scheduler.cancel(black_box(timer));
            }
            scheduler.is_empty()
        })
    });
}

criterion_group!(benches, one_shot, repeating, cancel);
criterion_main!(benches);
