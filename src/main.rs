//! Firmware binary: wires the hardware-agnostic core (ring buffers, matrix
//! scanner, line engine, command processor) to concrete STM32F103 ("Blue
//! Pill") peripherals under RTIC.
//!
//! Everything board-specific lives here, in `init`, and in the two tasks
//! below; `cv48_ps2kb::*` has no notion of `stm32f1xx_hal` at all.
#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

#[rtic::app(device = stm32f1xx_hal::pac, peripherals = true)]
mod app {
    use cv48_ps2kb::keymap::CREATIVISION_KEYMAP;
    use cv48_ps2kb::{CommandProcessor, InBuffer, LineEngine, MatrixScanner, OutBuffer};
    use stm32f1xx_hal::gpio::{Input, OpenDrain, Output, PullUp, Pxx};
    use stm32f1xx_hal::pac::TIM2;
    use stm32f1xx_hal::prelude::*;
    use stm32f1xx_hal::timer::{CountDownTimer, Event, Timer};

    /// ~40 us tick: half of an ~80 us PS/2 bit cell.
    const TICK_HZ: u32 = 25_000;
    /// Core-cycle budget for the 10 us data-to-clock skew at 72 MHz sysclk.
    const SKEW_CYCLES: u32 = 720;
    /// Core-cycle budget for the matrix row settle delay, also 10 us.
    const ROW_SETTLE_CYCLES: u32 = 720;

    type ClockPin = Pxx<Output<OpenDrain>>;
    type DataPin = Pxx<Output<OpenDrain>>;

    /// Eight row-drive pins, type-erased with `.downgrade()` so they can
    /// live in a plain array despite coming from two different GPIO ports.
    pub struct Rows([Pxx<Output<OpenDrain>>; 8]);

    impl cv48_ps2kb::hal::RowStrobe for Rows {
        const ROWS: usize = 8;

        fn select(&mut self, row: usize) {
            self.deselect_all();
            let _ = self.0[row].set_low();
            cortex_m::asm::delay(ROW_SETTLE_CYCLES);
        }

        fn deselect_all(&mut self) {
            for pin in &mut self.0 {
                let _ = pin.set_high();
            }
        }
    }

    /// Eight column-sample pins, likewise type-erased.
    pub struct Cols([Pxx<Input<PullUp>>; 8]);

    impl cv48_ps2kb::hal::ColumnPort for Cols {
        const COLS: usize = 8;

        fn sample(&self, col: usize) -> bool {
            self.0[col].is_high().unwrap_or(true)
        }
    }

    #[shared]
    struct Shared {
        out_buf: OutBuffer,
        in_buf: InBuffer,
    }

    #[local]
    struct Local {
        line_engine: LineEngine,
        clock: ClockPin,
        data: DataPin,
        scanner: MatrixScanner,
        cmd: CommandProcessor,
        rows: Rows,
        cols: Cols,
        timer: CountDownTimer<TIM2>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut flash = cx.device.FLASH.constrain();
        let mut rcc = cx.device.RCC.constrain();
        let clocks = rcc
            .cfgr
            .use_hse(8.mhz())
            .sysclk(72.mhz())
            .pclk1(36.mhz())
            .freeze(&mut flash.acr);

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.apb2);
        let mut gpiob = cx.device.GPIOB.split(&mut rcc.apb2);

        let clock = gpiob.pb6.into_open_drain_output(&mut gpiob.crl).downgrade();
        let data = gpiob.pb7.into_open_drain_output(&mut gpiob.crl).downgrade();

        let rows = Rows([
            gpioa.pa0.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa1.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa2.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa3.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa4.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa5.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa6.into_open_drain_output(&mut gpioa.crl).downgrade(),
            gpioa.pa7.into_open_drain_output(&mut gpioa.crl).downgrade(),
        ]);
        let cols = Cols([
            gpiob.pb0.into_pull_up_input(&mut gpiob.crl).downgrade(),
            gpiob.pb1.into_pull_up_input(&mut gpiob.crl).downgrade(),
            gpiob.pb10.into_pull_up_input(&mut gpiob.crh).downgrade(),
            gpiob.pb11.into_pull_up_input(&mut gpiob.crh).downgrade(),
            gpiob.pb12.into_pull_up_input(&mut gpiob.crh).downgrade(),
            gpiob.pb13.into_pull_up_input(&mut gpiob.crh).downgrade(),
            gpiob.pb14.into_pull_up_input(&mut gpiob.crh).downgrade(),
            gpiob.pb15.into_pull_up_input(&mut gpiob.crh).downgrade(),
        ]);

        let mut timer = Timer::tim2(cx.device.TIM2, &clocks, &mut rcc.apb1)
            .start_count_down(TICK_HZ.hz());
        timer.listen(Event::Update);

        defmt::info!("cv48-ps2kb init complete, tick rate {=u32} Hz", TICK_HZ);

        (
            Shared {
                out_buf: OutBuffer::new(),
                in_buf: InBuffer::new(),
            },
            Local {
                line_engine: LineEngine::new(),
                clock,
                data,
                scanner: MatrixScanner::new(CREATIVISION_KEYMAP),
                cmd: CommandProcessor::new(),
                rows,
                cols,
                timer,
            },
            init::Monotonics(),
        )
    }

    /// Runs every tick (~40 us). Always the higher-priority task, so it
    /// always preempts `idle`'s scan/drain loop at exactly this rate.
    #[task(binds = TIM2, priority = 2, local = [line_engine, clock, data, timer], shared = [out_buf, in_buf])]
    fn line_tick(mut cx: line_tick::Context) {
        cx.local.timer.clear_update_interrupt_flag();
        let line_engine = &mut *cx.local.line_engine;
        let clock = &mut *cx.local.clock;
        let data = &mut *cx.local.data;
        cx.shared.out_buf.lock(|out| {
            cx.shared.in_buf.lock(|in_buf| {
                line_engine.tick(clock, data, out, in_buf, || {
                    cortex_m::asm::delay(SKEW_CYCLES)
                });
            });
        });
    }

    /// Scans the matrix and drains host commands forever. Never the
    /// critical path: its only real-time obligation is to keep up with a
    /// human typing, which is orders of magnitude slower than the line
    /// engine's tick rate.
    ///
    /// Each emitted byte is locked individually rather than wrapping the
    /// whole scan pass in one lock: the row-settle delays inside `scan`
    /// easily exceed one tick period, and holding the resource ceiling
    /// that long would starve `line_tick` of its deadline. Keeping the
    /// critical section to one push at a time mirrors the narrow
    /// interrupt-disabled region the scanner's enqueue step requires.
    #[idle(local = [scanner, cmd, rows, cols], shared = [out_buf, in_buf])]
    fn idle(mut cx: idle::Context) -> ! {
        loop {
            let local = &mut cx.local;
            let shared = &mut cx.shared;
            local.scanner.scan(local.rows, local.cols, |byte| {
                shared.out_buf.lock(|out| out.push(byte));
            });

            let processed = cx.shared.in_buf.lock(|in_buf| {
                cx.shared
                    .out_buf
                    .lock(|out| cx.local.cmd.process_one(in_buf, out))
            });
            let _ = processed;
        }
    }
}
